//! TOML format types for catalog definition files.
//!
//! These types map directly to the on-disk catalog format (`[[items]]`,
//! `[[blueprints]]`, `[[reactions]]`) and are deserialized via `serde` +
//! the `toml` crate. Semantic validation (dangling references, cycles)
//! happens in [`super::Catalog`] construction, not here.

use serde::{Deserialize, Serialize};

/// Top-level structure of a catalog TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogToml {
    /// Item registry.
    #[serde(default)]
    pub items: Vec<ItemToml>,
    /// Manufacturing blueprints.
    #[serde(default)]
    pub blueprints: Vec<BlueprintToml>,
    /// Reaction formulas.
    #[serde(default)]
    pub reactions: Vec<ReactionToml>,
}

/// A single `[[items]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemToml {
    /// Unique integer identity, matching the game's type ids.
    pub id: i64,
    pub name: String,
    /// Category: "raw", "component", "reaction-product", or "final-product".
    pub category: String,
    /// Reference market price per unit, used when no current price is
    /// supplied with a resolution request.
    #[serde(default)]
    pub base_price: f64,
}

/// An input or output stack: an item id and a quantity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackToml {
    pub item: i64,
    pub quantity: i64,
}

/// A single `[[blueprints]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlueprintToml {
    pub id: i64,
    pub name: String,
    /// The one item this blueprint produces.
    pub output_item: i64,
    /// Units produced per run (the batch size).
    pub output_quantity: i64,
    /// Unmodified duration of a single run.
    pub base_time_seconds: i64,
    /// Facility class required to run this blueprint, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility: Option<String>,
    /// Required inputs per run, in declaration order.
    pub inputs: Vec<StackToml>,
}

/// A single `[[reactions]]` entry.
///
/// Reactions run at a fixed batch size and carry no efficiency modifiers;
/// they are only executable in the declared solar systems.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReactionToml {
    pub id: i64,
    pub name: String,
    /// Duration of one reaction cycle.
    pub batch_time_seconds: i64,
    /// Solar systems where this formula can run.
    pub systems: Vec<i64>,
    pub inputs: Vec<StackToml>,
    pub outputs: Vec<StackToml>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal_catalog() {
        let toml_str = r#"
[[items]]
id = 34
name = "Tritanium"
category = "raw"
base_price = 4.5
"#;
        let catalog: CatalogToml = toml::from_str(toml_str).expect("should parse");
        assert_eq!(catalog.items.len(), 1);
        assert_eq!(catalog.items[0].id, 34);
        assert_eq!(catalog.items[0].name, "Tritanium");
        assert!(catalog.blueprints.is_empty());
        assert!(catalog.reactions.is_empty());
    }

    #[test]
    fn deserialize_full_catalog() {
        let toml_str = r#"
[[items]]
id = 34
name = "Tritanium"
category = "raw"
base_price = 4.5

[[items]]
id = 603
name = "Merlin"
category = "final-product"
base_price = 350000.0

[[items]]
id = 16671
name = "Crystalline Carbonide"
category = "reaction-product"
base_price = 820.0

[[blueprints]]
id = 987
name = "Merlin Blueprint"
output_item = 603
output_quantity = 1
base_time_seconds = 6000
facility = "manufacturing-array"
inputs = [
    { item = 34, quantity = 22000 },
]

[[reactions]]
id = 17940
name = "Crystalline Carbonide Reaction"
batch_time_seconds = 10800
systems = [30002187, 30000142]
inputs = [
    { item = 34, quantity = 100 },
]
outputs = [
    { item = 16671, quantity = 10000 },
]
"#;
        let catalog: CatalogToml = toml::from_str(toml_str).expect("should parse");
        assert_eq!(catalog.items.len(), 3);
        assert_eq!(catalog.blueprints.len(), 1);
        assert_eq!(catalog.reactions.len(), 1);

        let bp = &catalog.blueprints[0];
        assert_eq!(bp.output_item, 603);
        assert_eq!(bp.facility.as_deref(), Some("manufacturing-array"));
        assert_eq!(bp.inputs[0].quantity, 22000);

        let rf = &catalog.reactions[0];
        assert_eq!(rf.systems, vec![30002187, 30000142]);
        assert_eq!(rf.outputs[0].item, 16671);
    }

    #[test]
    fn blueprint_without_facility() {
        let toml_str = r#"
[[items]]
id = 1
name = "Thing"
category = "component"

[[blueprints]]
id = 2
name = "Thing Blueprint"
output_item = 1
output_quantity = 5
base_time_seconds = 60
inputs = [{ item = 1, quantity = 1 }]
"#;
        let catalog: CatalogToml = toml::from_str(toml_str).expect("should parse");
        assert_eq!(catalog.blueprints[0].facility, None);
    }

    #[test]
    fn base_price_defaults_to_zero() {
        let toml_str = r#"
[[items]]
id = 7
name = "Unpriced"
category = "component"
"#;
        let catalog: CatalogToml = toml::from_str(toml_str).expect("should parse");
        assert_eq!(catalog.items[0].base_price, 0.0);
    }

    #[test]
    fn roundtrip_serialize_deserialize() {
        let catalog = CatalogToml {
            items: vec![ItemToml {
                id: 34,
                name: "Tritanium".to_owned(),
                category: "raw".to_owned(),
                base_price: 4.5,
            }],
            blueprints: vec![BlueprintToml {
                id: 1,
                name: "Widget Blueprint".to_owned(),
                output_item: 34,
                output_quantity: 5,
                base_time_seconds: 1200,
                facility: None,
                inputs: vec![StackToml {
                    item: 34,
                    quantity: 3,
                }],
            }],
            reactions: vec![],
        };

        let serialized = toml::to_string(&catalog).expect("should serialize");
        let deserialized: CatalogToml = toml::from_str(&serialized).expect("should deserialize");
        assert_eq!(catalog, deserialized);
    }
}
