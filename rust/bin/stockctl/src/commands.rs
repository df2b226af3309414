//! Command dispatch. Each command returns the JSON value to print.

use std::path::Path;

use serde_json::{json, Value};

use stockroom_core::new_id;
use stockroom_stock::StockModule;
use stockroom_stock::bot::SqlBotDirectory;
use stockroom_stock::model::{BotId, NewProduct, ProductPatch};

use crate::{BotAction, CategoryAction, Commands, ProductAction, RepairAction, StockAction};

pub struct Context<'a> {
    pub bot_id: BotId,
    pub bots: &'a SqlBotDirectory,
    pub stock: &'a StockModule,
}

pub fn run(ctx: &Context<'_>, command: Commands) -> anyhow::Result<Value> {
    match command {
        Commands::Bot { action } => bot(ctx, action),
        Commands::Product { action } => product(ctx, action),
        Commands::Stock { action } => stock(ctx, action),
        Commands::Claim { product, quantity, tx } => {
            let tx = tx.unwrap_or_else(new_id);
            let result = ctx.stock.allocation().claim(ctx.bot_id, &product, quantity, &tx)?;
            Ok(serde_json::to_value(result)?)
        }
        Commands::Release { tx } => {
            let released = ctx.stock.allocation().release(&tx)?;
            Ok(json!({ "transactionRef": tx, "released": released }))
        }
        Commands::Transaction { tx } => {
            Ok(serde_json::to_value(ctx.stock.allocation().transaction_units(&tx)?)?)
        }
        Commands::Category { action } => category(ctx, action),
        Commands::Repair { action } => repair(ctx, action),
    }
}

fn bot(ctx: &Context<'_>, action: BotAction) -> anyhow::Result<Value> {
    let bot = match action {
        BotAction::Add { name } => ctx.bots.register(ctx.bot_id, &name)?,
        BotAction::Show => ctx.bots.get(ctx.bot_id)?,
    };
    Ok(serde_json::to_value(bot)?)
}

fn product(ctx: &Context<'_>, action: ProductAction) -> anyhow::Result<Value> {
    let catalog = ctx.stock.catalog();
    let bot_id = ctx.bot_id;
    let value = match action {
        ProductAction::Add { id, name, price, description, terms } => {
            serde_json::to_value(catalog.create_product(bot_id, NewProduct {
                product_id: id,
                name,
                price,
                description,
                terms,
            })?)?
        }
        ProductAction::Show { id } => serde_json::to_value(catalog.product_view(bot_id, &id)?)?,
        ProductAction::List => serde_json::to_value(catalog.list_products(bot_id)?)?,
        ProductAction::Edit { id, name, price, description, terms } => {
            serde_json::to_value(catalog.edit_product(bot_id, &id, ProductPatch {
                name,
                price,
                description,
                terms,
            })?)?
        }
        ProductAction::Rename { old, new } => {
            serde_json::to_value(catalog.rename_product_id(bot_id, &old, &new)?)?
        }
        ProductAction::Delete { id } => json!({ "message": catalog.delete_product(bot_id, &id)? }),
        ProductAction::Sold { id, quantity } => {
            serde_json::to_value(catalog.record_sold(bot_id, &id, quantity)?)?
        }
    };
    Ok(value)
}

fn stock(ctx: &Context<'_>, action: StockAction) -> anyhow::Result<Value> {
    let bot_id = ctx.bot_id;
    let value = match action {
        StockAction::Add { product, entries, file } => {
            let entries = gather_entries(entries, file.as_deref())?;
            serde_json::to_value(ctx.stock.bulk().add_stock(bot_id, &product, &entries)?)?
        }
        StockAction::Remove { product, entries, file } => {
            let entries = gather_entries(entries, file.as_deref())?;
            serde_json::to_value(ctx.stock.bulk().remove_stock(bot_id, &product, &entries)?)?
        }
        StockAction::List { product, limit } => {
            serde_json::to_value(ctx.stock.pool().list_available(bot_id, &product, limit)?)?
        }
    };
    Ok(value)
}

fn category(ctx: &Context<'_>, action: CategoryAction) -> anyhow::Result<Value> {
    let catalog = ctx.stock.catalog();
    let bot_id = ctx.bot_id;
    let value = match action {
        CategoryAction::Set { name, products } => {
            json!({ "name": name, "productIds": catalog.upsert_category(bot_id, &name, &products)? })
        }
        CategoryAction::Create { name, products } => {
            json!({ "name": name, "productIds": catalog.create_category(bot_id, &name, &products)? })
        }
        CategoryAction::Append { name, products } => {
            json!({ "name": name, "productIds": catalog.append_to_category(bot_id, &name, &products)? })
        }
        CategoryAction::Show { name } => serde_json::to_value(catalog.get_category(bot_id, &name)?)?,
        CategoryAction::List => serde_json::to_value(catalog.list_categories(bot_id)?)?,
        CategoryAction::Delete { name } => {
            catalog.delete_category(bot_id, &name)?;
            json!({ "deleted": name })
        }
        CategoryAction::Remove { name, product } => {
            let members = catalog.remove_product_from_category(bot_id, &name, &product)?;
            json!({ "name": name, "productIds": members })
        }
    };
    Ok(value)
}

fn repair(ctx: &Context<'_>, action: RepairAction) -> anyhow::Result<Value> {
    let sweep = ctx.stock.repair();
    let bot_id = ctx.bot_id;
    let value = match action {
        RepairAction::Scan => serde_json::to_value(sweep.scan(bot_id)?)?,
        RepairAction::Purge { product } => {
            json!({ "productId": product, "purged": sweep.purge_orphan_stock(bot_id, &product)? })
        }
        RepairAction::Reattach { from, to } => {
            json!({ "from": from, "to": to, "moved": sweep.reattach_orphan_stock(bot_id, &from, &to)? })
        }
    };
    Ok(value)
}

/// Positional entries followed by the entries of an optional JSON array file.
fn gather_entries(mut entries: Vec<String>, file: Option<&Path>) -> anyhow::Result<Vec<String>> {
    if let Some(path) = file {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        let from_file: Vec<String> = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("{} must hold a JSON array of strings: {}", path.display(), e))?;
        entries.extend(from_file);
    }
    Ok(entries)
}
