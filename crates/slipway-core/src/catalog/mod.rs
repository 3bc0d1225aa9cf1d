//! The recipe catalog: items, manufacturing blueprints, and reaction
//! formulas, indexed for O(1) lookup by identity and by producer.
//!
//! A catalog is loaded once at process start, validated (duplicate ids,
//! dangling item references, cyclic recipes all fail the load outright),
//! and treated as immutable for the life of the process. Reload means
//! restart.

pub mod toml_format;

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use toml_format::CatalogToml;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Category of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemCategory {
    Raw,
    Component,
    ReactionProduct,
    FinalProduct,
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Raw => "raw",
            Self::Component => "component",
            Self::ReactionProduct => "reaction-product",
            Self::FinalProduct => "final-product",
        };
        f.write_str(s)
    }
}

impl FromStr for ItemCategory {
    type Err = ItemCategoryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Self::Raw),
            "component" => Ok(Self::Component),
            "reaction-product" => Ok(Self::ReactionProduct),
            "final-product" => Ok(Self::FinalProduct),
            other => Err(ItemCategoryParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ItemCategory`] string.
#[derive(Debug, Clone)]
pub struct ItemCategoryParseError(pub String);

impl fmt::Display for ItemCategoryParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid item category: {:?}", self.0)
    }
}

impl std::error::Error for ItemCategoryParseError {}

/// A catalog item. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub category: ItemCategory,
    /// Reference market price per unit.
    pub base_price: f64,
}

/// One required input of a blueprint run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueprintInput {
    pub item: i64,
    pub quantity: i64,
}

/// A manufacturing blueprint: converts inputs to exactly one output item
/// at a fixed per-run ratio, subject to per-owner efficiency modifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: i64,
    pub name: String,
    pub output_item: i64,
    /// Units produced per run (the batch size).
    pub output_quantity: i64,
    pub base_time_seconds: i64,
    /// Facility class required to run this blueprint, if any.
    pub facility: Option<String>,
    /// Per-run inputs, in declaration order.
    pub inputs: Vec<BlueprintInput>,
}

/// An input or output stack of a reaction formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionStack {
    pub item: i64,
    pub quantity: i64,
}

/// A reaction formula: a fixed input multiset converted to a fixed output
/// multiset per cycle, executable only in the declared solar systems.
/// Reactions have no efficiency modifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionFormula {
    pub id: i64,
    pub name: String,
    pub batch_time_seconds: i64,
    pub systems: Vec<i64>,
    pub inputs: Vec<ReactionStack>,
    pub outputs: Vec<ReactionStack>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading a catalog. Any of these fails the entire
/// load; a partially loaded catalog could produce incorrect plans.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate item id {0}")]
    DuplicateItem(i64),
    #[error("duplicate blueprint id {0}")]
    DuplicateBlueprint(i64),
    #[error("duplicate reaction id {0}")]
    DuplicateReaction(i64),
    #[error("item {item}: {source}")]
    InvalidCategory {
        item: i64,
        source: ItemCategoryParseError,
    },
    #[error("{context} references unknown item {item}")]
    UnknownItemRef { context: String, item: i64 },
    #[error("{context}: {reason}")]
    InvalidRecipe { context: String, reason: String },
    #[error("cyclic recipe detected involving: {0}")]
    CyclicRecipe(String),
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The loaded, validated recipe registry.
#[derive(Debug, Clone)]
pub struct Catalog {
    items: HashMap<i64, Item>,
    blueprints: HashMap<i64, Blueprint>,
    reactions: HashMap<i64, ReactionFormula>,
    /// item id -> blueprint ids producing it, in declaration order.
    blueprints_by_output: HashMap<i64, Vec<i64>>,
    /// item id -> reaction ids with it among their outputs, in declaration order.
    reactions_by_output: HashMap<i64, Vec<i64>>,
    /// Union of all systems any formula declares.
    reaction_systems: BTreeSet<i64>,
}

impl Catalog {
    /// Load and validate a catalog from a TOML file on disk.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a catalog from TOML content.
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let raw: CatalogToml = toml::from_str(content)?;
        Self::from_toml(raw)
    }

    fn from_toml(raw: CatalogToml) -> Result<Self, CatalogError> {
        let mut items = HashMap::with_capacity(raw.items.len());
        for item in raw.items {
            let category: ItemCategory =
                item.category
                    .parse()
                    .map_err(|source| CatalogError::InvalidCategory {
                        item: item.id,
                        source,
                    })?;
            let parsed = Item {
                id: item.id,
                name: item.name,
                category,
                base_price: item.base_price,
            };
            if items.insert(parsed.id, parsed).is_some() {
                return Err(CatalogError::DuplicateItem(item.id));
            }
        }

        let require_item = |context: &dyn Fn() -> String, id: i64| {
            if items.contains_key(&id) {
                Ok(())
            } else {
                Err(CatalogError::UnknownItemRef {
                    context: context(),
                    item: id,
                })
            }
        };

        let mut blueprints = HashMap::with_capacity(raw.blueprints.len());
        let mut blueprints_by_output: HashMap<i64, Vec<i64>> = HashMap::new();
        for bp in raw.blueprints {
            let context = || format!("blueprint {} ({})", bp.id, bp.name);
            require_item(&context, bp.output_item)?;
            if bp.inputs.is_empty() {
                return Err(CatalogError::InvalidRecipe {
                    context: context(),
                    reason: "no inputs declared".to_owned(),
                });
            }
            if bp.output_quantity <= 0 || bp.base_time_seconds <= 0 {
                return Err(CatalogError::InvalidRecipe {
                    context: context(),
                    reason: "output quantity and run time must be positive".to_owned(),
                });
            }
            let mut inputs = Vec::with_capacity(bp.inputs.len());
            for input in &bp.inputs {
                require_item(&context, input.item)?;
                if input.quantity <= 0 {
                    return Err(CatalogError::InvalidRecipe {
                        context: context(),
                        reason: format!("input {} quantity must be positive", input.item),
                    });
                }
                inputs.push(BlueprintInput {
                    item: input.item,
                    quantity: input.quantity,
                });
            }
            let parsed = Blueprint {
                id: bp.id,
                name: bp.name.clone(),
                output_item: bp.output_item,
                output_quantity: bp.output_quantity,
                base_time_seconds: bp.base_time_seconds,
                facility: bp.facility.clone(),
                inputs,
            };
            blueprints_by_output
                .entry(parsed.output_item)
                .or_default()
                .push(parsed.id);
            if blueprints.insert(parsed.id, parsed).is_some() {
                return Err(CatalogError::DuplicateBlueprint(bp.id));
            }
        }

        let mut reactions = HashMap::with_capacity(raw.reactions.len());
        let mut reactions_by_output: HashMap<i64, Vec<i64>> = HashMap::new();
        let mut reaction_systems = BTreeSet::new();
        for rf in raw.reactions {
            let context = || format!("reaction {} ({})", rf.id, rf.name);
            if rf.inputs.is_empty() || rf.outputs.is_empty() {
                return Err(CatalogError::InvalidRecipe {
                    context: context(),
                    reason: "inputs and outputs must both be non-empty".to_owned(),
                });
            }
            if rf.systems.is_empty() {
                return Err(CatalogError::InvalidRecipe {
                    context: context(),
                    reason: "no reaction-capable systems declared".to_owned(),
                });
            }
            if rf.batch_time_seconds <= 0 {
                return Err(CatalogError::InvalidRecipe {
                    context: context(),
                    reason: "batch time must be positive".to_owned(),
                });
            }
            for stack in rf.inputs.iter().chain(rf.outputs.iter()) {
                require_item(&context, stack.item)?;
                if stack.quantity <= 0 {
                    return Err(CatalogError::InvalidRecipe {
                        context: context(),
                        reason: format!("stack {} quantity must be positive", stack.item),
                    });
                }
            }
            let parsed = ReactionFormula {
                id: rf.id,
                name: rf.name.clone(),
                batch_time_seconds: rf.batch_time_seconds,
                systems: rf.systems.clone(),
                inputs: rf
                    .inputs
                    .iter()
                    .map(|s| ReactionStack {
                        item: s.item,
                        quantity: s.quantity,
                    })
                    .collect(),
                outputs: rf
                    .outputs
                    .iter()
                    .map(|s| ReactionStack {
                        item: s.item,
                        quantity: s.quantity,
                    })
                    .collect(),
            };
            reaction_systems.extend(parsed.systems.iter().copied());
            for output in &parsed.outputs {
                reactions_by_output
                    .entry(output.item)
                    .or_default()
                    .push(parsed.id);
            }
            if reactions.insert(parsed.id, parsed).is_some() {
                return Err(CatalogError::DuplicateReaction(rf.id));
            }
        }

        let catalog = Self {
            items,
            blueprints,
            reactions,
            blueprints_by_output,
            reactions_by_output,
            reaction_systems,
        };
        catalog.reject_cycles()?;
        Ok(catalog)
    }

    /// Reject recipe graphs where an item appears, directly or transitively,
    /// among the inputs of its own producer.
    ///
    /// Kahn's algorithm over item-level edges (input item -> output item).
    /// Items left with a nonzero in-degree after the sweep are cycle members.
    fn reject_cycles(&self) -> Result<(), CatalogError> {
        let mut in_degree: HashMap<i64, usize> = self.items.keys().map(|&id| (id, 0)).collect();
        let mut adjacency: HashMap<i64, Vec<i64>> = HashMap::new();

        let add_edge =
            |adjacency: &mut HashMap<i64, Vec<i64>>,
             in_degree: &mut HashMap<i64, usize>,
             from: i64,
             to: i64| {
                adjacency.entry(from).or_default().push(to);
                *in_degree.entry(to).or_default() += 1;
            };

        for bp in self.blueprints.values() {
            for input in &bp.inputs {
                add_edge(&mut adjacency, &mut in_degree, input.item, bp.output_item);
            }
        }
        for rf in self.reactions.values() {
            for input in &rf.inputs {
                for output in &rf.outputs {
                    add_edge(&mut adjacency, &mut in_degree, input.item, output.item);
                }
            }
        }

        let mut queue: VecDeque<i64> = VecDeque::new();
        let mut zero_degree: Vec<i64> = in_degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        zero_degree.sort_unstable();
        queue.extend(zero_degree);

        let mut visited = 0usize;
        while let Some(current) = queue.pop_front() {
            visited += 1;
            if let Some(neighbors) = adjacency.get(&current) {
                for &neighbor in neighbors {
                    let degree = in_degree
                        .get_mut(&neighbor)
                        .expect("in_degree seeded for every item");
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        if visited != in_degree.len() {
            let mut members: Vec<String> = in_degree
                .iter()
                .filter(|&(_, &d)| d > 0)
                .map(|(&id, _)| {
                    self.items
                        .get(&id)
                        .map(|i| i.name.clone())
                        .unwrap_or_else(|| id.to_string())
                })
                .collect();
            members.sort();
            return Err(CatalogError::CyclicRecipe(members.join(", ")));
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lookups (pure, side-effect free)
    // -----------------------------------------------------------------------

    /// Look up an item by id.
    pub fn item(&self, id: i64) -> Option<&Item> {
        self.items.get(&id)
    }

    /// Look up a blueprint by id.
    pub fn blueprint(&self, id: i64) -> Option<&Blueprint> {
        self.blueprints.get(&id)
    }

    /// Look up a reaction formula by id.
    pub fn reaction(&self, id: i64) -> Option<&ReactionFormula> {
        self.reactions.get(&id)
    }

    /// All blueprints producing an item, in declaration order. May be empty
    /// or carry multiple candidates (e.g. invention variants).
    pub fn blueprints_producing(&self, item: i64) -> Vec<&Blueprint> {
        self.blueprints_by_output
            .get(&item)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.blueprints.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All reaction formulas with the item among their outputs, in
    /// declaration order.
    pub fn reactions_producing(&self, item: i64) -> Vec<&ReactionFormula> {
        self.reactions_by_output
            .get(&item)
            .map(|ids| ids.iter().filter_map(|id| self.reactions.get(id)).collect())
            .unwrap_or_default()
    }

    /// Whether no blueprint and no reaction produces this item.
    pub fn is_raw(&self, item: i64) -> bool {
        !self.blueprints_by_output.contains_key(&item)
            && !self.reactions_by_output.contains_key(&item)
    }

    /// All reaction-capable systems any formula declares. The per-character
    /// reachable subset is supplied in the resolve context.
    pub fn reaction_systems(&self) -> &BTreeSet<i64> {
        &self.reaction_systems
    }

    /// Iterate over all items (unordered).
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// Counts of (items, blueprints, reactions), for summaries.
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.items.len(), self.blueprints.len(), self.reactions.len())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
