//! CLI handlers for `slipway catalog` subcommands.
//!
//! The catalog is already loaded (and therefore validated) by the time
//! these run; `check` exists so operators can vet a catalog file before
//! pointing the server at it.

use anyhow::Result;

use slipway_core::catalog::Catalog;

use crate::CatalogCommands;

/// Dispatch a `CatalogCommands` variant to the appropriate handler.
pub fn run_catalog_command(command: CatalogCommands, catalog: &Catalog) -> Result<()> {
    match command {
        CatalogCommands::Check => cmd_check(catalog),
        CatalogCommands::Info => cmd_info(catalog),
    }
}

/// Print a validation summary. Reaching this point means the catalog
/// parsed, every reference resolved, and the recipe graph is acyclic.
fn cmd_check(catalog: &Catalog) -> Result<()> {
    let (items, blueprints, reactions) = catalog.counts();

    println!("Catalog OK.");
    println!();
    println!("  Items:      {items}");
    println!("  Blueprints: {blueprints}");
    println!("  Reactions:  {reactions}");

    let systems = catalog.reaction_systems();
    if !systems.is_empty() {
        let listed: Vec<String> = systems.iter().map(|s| s.to_string()).collect();
        println!("  Reaction systems: {}", listed.join(", "));
    }

    Ok(())
}

/// List items with category, reference price, and producer counts.
fn cmd_info(catalog: &Catalog) -> Result<()> {
    let mut items: Vec<_> = catalog.items().collect();
    items.sort_by_key(|i| i.id);

    let name_w = items.iter().map(|i| i.name.len()).max().unwrap_or(4).max(4);

    println!(
        "{:>10}  {:<name_w$}  {:<16}  {:>14}  {:>10}  {:>9}",
        "ID", "NAME", "CATEGORY", "BASE PRICE", "BLUEPRINTS", "REACTIONS"
    );
    for item in items {
        println!(
            "{:>10}  {:<name_w$}  {:<16}  {:>14.2}  {:>10}  {:>9}",
            item.id,
            item.name,
            item.category.to_string(),
            item.base_price,
            catalog.blueprints_producing(item.id).len(),
            catalog.reactions_producing(item.id).len(),
        );
    }

    Ok(())
}
