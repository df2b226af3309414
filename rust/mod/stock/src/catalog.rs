use std::sync::Arc;

use tracing::info;

use stockroom_core::{ServiceError, now_rfc3339};
use stockroom_sql::{Row, SQLError, SQLStore, Statement, Value};

use crate::bot::BotDirectory;
use crate::model::{BotId, Category, NewProduct, Product, ProductPatch, ProductView};
use crate::pool::StockPool;
use crate::schema::{product_exists, required_i64, required_str, sql_error};

const PRODUCT_COLUMNS: &str =
    "bot_id, product_id, name, price, description, terms, sold, create_at, update_at";

/// Product and category records, and the cascades that keep stock and
/// category membership consistent with product identifier changes.
pub struct CatalogIndex {
    sql: Arc<dyn SQLStore>,
    pool: Arc<StockPool>,
    bots: Arc<dyn BotDirectory>,
}

impl CatalogIndex {
    pub fn new(sql: Arc<dyn SQLStore>, pool: Arc<StockPool>, bots: Arc<dyn BotDirectory>) -> Self {
        Self { sql, pool, bots }
    }

    fn require_bot(&self, bot_id: BotId) -> Result<(), ServiceError> {
        if self.bots.exists(bot_id)? {
            Ok(())
        } else {
            Err(ServiceError::NotFound(format!("bot {bot_id}")))
        }
    }

    // ── Products ──

    pub fn product_exists(&self, bot_id: BotId, product_id: &str) -> Result<bool, ServiceError> {
        product_exists(self.sql.as_ref(), bot_id, product_id)
    }

    pub fn create_product(&self, bot_id: BotId, input: NewProduct) -> Result<Product, ServiceError> {
        let product_id = input.product_id.trim().to_string();
        if product_id.is_empty() {
            return Err(ServiceError::Validation("product id is required".into()));
        }
        validate_name(&input.name)?;
        validate_price(input.price)?;
        self.require_bot(bot_id)?;

        let now = now_rfc3339();
        let product = Product {
            bot_id,
            product_id,
            name: input.name.trim().to_string(),
            price: input.price,
            description: input.description,
            terms: input.terms,
            sold: 0,
            create_at: now.clone(),
            update_at: now,
        };

        self.sql
            .exec(
                &format!(
                    "INSERT INTO products ({PRODUCT_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                &[
                    Value::Integer(product.bot_id),
                    Value::from(product.product_id.as_str()),
                    Value::from(product.name.as_str()),
                    Value::Integer(product.price),
                    Value::from(product.description.as_str()),
                    Value::from(product.terms.as_str()),
                    Value::Integer(product.sold),
                    Value::from(product.create_at.as_str()),
                    Value::from(product.update_at.as_str()),
                ],
            )
            .map_err(|e| match sql_error(e) {
                ServiceError::Conflict(_) => ServiceError::Conflict(format!(
                    "product {bot_id}/{} already exists",
                    product.product_id
                )),
                other => other,
            })?;

        info!(bot_id, product_id = %product.product_id, "product created");
        Ok(product)
    }

    pub fn get_product(&self, bot_id: BotId, product_id: &str) -> Result<Product, ServiceError> {
        let rows = self
            .sql
            .query(
                &format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products WHERE bot_id = ?1 AND product_id = ?2"
                ),
                &[Value::Integer(bot_id), Value::from(product_id)],
            )
            .map_err(sql_error)?;
        let row = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound(format!("product {bot_id}/{product_id}")))?;
        row_to_product(row)
    }

    /// A product with its live available count.
    pub fn product_view(&self, bot_id: BotId, product_id: &str) -> Result<ProductView, ServiceError> {
        let product = self.get_product(bot_id, product_id)?;
        let stock = self.pool.count_available(bot_id, product_id)?;
        Ok(ProductView { product, stock })
    }

    /// All products of a bot, ordered by id, with live available counts.
    pub fn list_products(&self, bot_id: BotId) -> Result<Vec<ProductView>, ServiceError> {
        let rows = self
            .sql
            .query(
                &format!(
                    "SELECT {PRODUCT_COLUMNS}, \
                            (SELECT COUNT(*) FROM stock_units s \
                              WHERE s.bot_id = p.bot_id AND s.product_id = p.product_id \
                                AND s.consumed = 0) AS stock \
                     FROM products p WHERE p.bot_id = ?1 ORDER BY p.product_id ASC"
                ),
                &[Value::Integer(bot_id)],
            )
            .map_err(sql_error)?;

        rows.iter()
            .map(|row| {
                Ok(ProductView {
                    product: row_to_product(row)?,
                    stock: required_i64(row, "stock")?.max(0) as u64,
                })
            })
            .collect()
    }

    /// Partial update of name / price / description / terms.
    pub fn edit_product(
        &self,
        bot_id: BotId,
        product_id: &str,
        patch: ProductPatch,
    ) -> Result<Product, ServiceError> {
        if patch.is_empty() {
            return Err(ServiceError::Validation("nothing to update".into()));
        }
        if let Some(ref name) = patch.name {
            validate_name(name)?;
        }
        if let Some(price) = patch.price {
            validate_price(price)?;
        }

        let mut sets = Vec::new();
        let mut params = vec![Value::Integer(bot_id), Value::from(product_id)];
        let mut push = |col: &str, val: Value| {
            params.push(val);
            sets.push(format!("{col} = ?{}", params.len()));
        };
        if let Some(name) = patch.name {
            push("name", Value::from(name.trim()));
        }
        if let Some(price) = patch.price {
            push("price", Value::Integer(price));
        }
        if let Some(description) = patch.description {
            push("description", Value::from(description));
        }
        if let Some(terms) = patch.terms {
            push("terms", Value::from(terms));
        }
        push("update_at", Value::from(now_rfc3339()));

        let affected = self
            .sql
            .exec(
                &format!(
                    "UPDATE products SET {} WHERE bot_id = ?1 AND product_id = ?2",
                    sets.join(", ")
                ),
                &params,
            )
            .map_err(sql_error)?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!("product {bot_id}/{product_id}")));
        }

        self.get_product(bot_id, product_id)
    }

    pub fn edit_name(&self, bot_id: BotId, product_id: &str, name: &str) -> Result<Product, ServiceError> {
        self.edit_product(bot_id, product_id, ProductPatch {
            name: Some(name.to_string()),
            ..Default::default()
        })
    }

    pub fn edit_price(&self, bot_id: BotId, product_id: &str, price: i64) -> Result<Product, ServiceError> {
        self.edit_product(bot_id, product_id, ProductPatch {
            price: Some(price),
            ..Default::default()
        })
    }

    pub fn edit_description(
        &self,
        bot_id: BotId,
        product_id: &str,
        description: &str,
    ) -> Result<Product, ServiceError> {
        self.edit_product(bot_id, product_id, ProductPatch {
            description: Some(description.to_string()),
            ..Default::default()
        })
    }

    pub fn edit_terms(&self, bot_id: BotId, product_id: &str, terms: &str) -> Result<Product, ServiceError> {
        self.edit_product(bot_id, product_id, ProductPatch {
            terms: Some(terms.to_string()),
            ..Default::default()
        })
    }

    /// Atomically add `quantity` to the sold counter.
    pub fn record_sold(&self, bot_id: BotId, product_id: &str, quantity: i64) -> Result<Product, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::Validation(format!(
                "sold quantity must be at least 1, got {quantity}"
            )));
        }
        let rows = self
            .sql
            .query(
                &format!(
                    "UPDATE products SET sold = sold + ?3, update_at = ?4 \
                     WHERE bot_id = ?1 AND product_id = ?2 RETURNING {PRODUCT_COLUMNS}"
                ),
                &[
                    Value::Integer(bot_id),
                    Value::from(product_id),
                    Value::Integer(quantity),
                    Value::from(now_rfc3339()),
                ],
            )
            .map_err(sql_error)?;
        let row = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound(format!("product {bot_id}/{product_id}")))?;
        row_to_product(row)
    }

    /// Rename a product identifier and cascade to stock and categories.
    ///
    /// Steps, in order: product row, stock units (via the pool), then each
    /// category occurrence in place (position and duplicate count kept).
    /// The three steps commit as one transaction.
    pub fn rename_product_id(
        &self,
        bot_id: BotId,
        old_id: &str,
        new_id: &str,
    ) -> Result<Product, ServiceError> {
        let new_id = new_id.trim();
        if new_id.is_empty() {
            return Err(ServiceError::Validation("new product id is required".into()));
        }
        if self.product_exists(bot_id, new_id)? {
            return Err(ServiceError::Conflict(format!(
                "product {bot_id}/{new_id} already exists"
            )));
        }
        if !self.product_exists(bot_id, old_id)? {
            return Err(ServiceError::NotFound(format!("product {bot_id}/{old_id}")));
        }

        let statements = vec![
            Statement::new(
                "UPDATE products SET product_id = ?3, update_at = ?4 \
                 WHERE bot_id = ?1 AND product_id = ?2",
                vec![
                    Value::Integer(bot_id),
                    Value::from(old_id),
                    Value::from(new_id),
                    Value::from(now_rfc3339()),
                ],
            )
            .require_rows(),
            StockPool::reassign_statement(bot_id, old_id, new_id),
            Statement::new(
                "UPDATE category_members SET product_id = ?3 WHERE bot_id = ?1 AND product_id = ?2",
                vec![Value::Integer(bot_id), Value::from(old_id), Value::from(new_id)],
            ),
        ];

        let counts = self.sql.exec_batch(&statements).map_err(|e| match e {
            SQLError::NoRowsAffected(_) => ServiceError::NotFound(format!("product {bot_id}/{old_id}")),
            SQLError::Constraint(_) => {
                ServiceError::Conflict(format!("product {bot_id}/{new_id} already exists"))
            }
            other => sql_error(other),
        })?;

        info!(
            bot_id,
            old_id,
            new_id,
            units = counts[1],
            memberships = counts[2],
            "product id renamed"
        );
        self.get_product(bot_id, new_id)
    }

    /// Delete a product, all its stock units and every category occurrence.
    pub fn delete_product(&self, bot_id: BotId, product_id: &str) -> Result<String, ServiceError> {
        let statements = vec![
            Statement::new(
                "DELETE FROM products WHERE bot_id = ?1 AND product_id = ?2",
                vec![Value::Integer(bot_id), Value::from(product_id)],
            )
            .require_rows(),
            StockPool::delete_all_statement(bot_id, product_id),
            Statement::new(
                "DELETE FROM category_members WHERE bot_id = ?1 AND product_id = ?2",
                vec![Value::Integer(bot_id), Value::from(product_id)],
            ),
        ];

        let counts = self.sql.exec_batch(&statements).map_err(|e| match e {
            SQLError::NoRowsAffected(_) => {
                ServiceError::NotFound(format!("product {bot_id}/{product_id}"))
            }
            other => sql_error(other),
        })?;

        info!(
            bot_id,
            product_id,
            units = counts[1],
            memberships = counts[2],
            "product deleted"
        );
        Ok(format!("product {product_id} deleted"))
    }

    // ── Categories ──

    fn category_exists(&self, bot_id: BotId, name: &str) -> Result<bool, ServiceError> {
        let rows = self
            .sql
            .query(
                "SELECT 1 AS found FROM categories WHERE bot_id = ?1 AND name = ?2",
                &[Value::Integer(bot_id), Value::from(name)],
            )
            .map_err(sql_error)?;
        Ok(!rows.is_empty())
    }

    fn members(&self, bot_id: BotId, name: &str) -> Result<Vec<String>, ServiceError> {
        let rows = self
            .sql
            .query(
                "SELECT product_id FROM category_members \
                 WHERE bot_id = ?1 AND category = ?2 ORDER BY position ASC",
                &[Value::Integer(bot_id), Value::from(name)],
            )
            .map_err(sql_error)?;
        rows.iter().map(|r| required_str(r, "product_id")).collect()
    }

    /// Statements appending `product_ids` after the current last position.
    fn append_statements(bot_id: BotId, name: &str, product_ids: &[String]) -> Vec<Statement> {
        product_ids
            .iter()
            .map(|pid| {
                Statement::new(
                    "INSERT INTO category_members (bot_id, category, position, product_id) \
                     VALUES (?1, ?2, \
                             (SELECT COALESCE(MAX(position), -1) + 1 FROM category_members \
                               WHERE bot_id = ?1 AND category = ?2), \
                             ?3)",
                    vec![Value::Integer(bot_id), Value::from(name), Value::from(pid.as_str())],
                )
            })
            .collect()
    }

    fn touch_statement(bot_id: BotId, name: &str, now: &str) -> Statement {
        Statement::new(
            "UPDATE categories SET update_at = ?3 WHERE bot_id = ?1 AND name = ?2",
            vec![Value::Integer(bot_id), Value::from(name), Value::from(now)],
        )
        .require_rows()
    }

    fn validate_category_name(name: &str) -> Result<(), ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::Validation("category name is required".into()));
        }
        Ok(())
    }

    /// Create a category. Fails with `Conflict` if the name is taken.
    pub fn create_category(
        &self,
        bot_id: BotId,
        name: &str,
        product_ids: &[String],
    ) -> Result<Vec<String>, ServiceError> {
        Self::validate_category_name(name)?;
        self.require_bot(bot_id)?;

        let now = now_rfc3339();
        let mut statements = vec![Statement::new(
            "INSERT INTO categories (bot_id, name, create_at, update_at) VALUES (?1, ?2, ?3, ?3)",
            vec![Value::Integer(bot_id), Value::from(name), Value::from(now.as_str())],
        )];
        statements.extend(Self::append_statements(bot_id, name, product_ids));

        self.sql.exec_batch(&statements).map_err(|e| match sql_error(e) {
            ServiceError::Conflict(_) => {
                ServiceError::Conflict(format!("category {bot_id}/{name} already exists"))
            }
            other => other,
        })?;

        info!(bot_id, category = name, members = product_ids.len(), "category created");
        Ok(product_ids.to_vec())
    }

    /// Create-or-replace. An existing membership list is replaced wholesale,
    /// never merged. Listed product ids are not checked for existence.
    pub fn upsert_category(
        &self,
        bot_id: BotId,
        name: &str,
        product_ids: &[String],
    ) -> Result<Vec<String>, ServiceError> {
        Self::validate_category_name(name)?;
        self.require_bot(bot_id)?;

        let now = now_rfc3339();
        let mut statements = vec![
            Statement::new(
                "INSERT INTO categories (bot_id, name, create_at, update_at) VALUES (?1, ?2, ?3, ?3) \
                 ON CONFLICT (bot_id, name) DO UPDATE SET update_at = excluded.update_at",
                vec![Value::Integer(bot_id), Value::from(name), Value::from(now.as_str())],
            ),
            Statement::new(
                "DELETE FROM category_members WHERE bot_id = ?1 AND category = ?2",
                vec![Value::Integer(bot_id), Value::from(name)],
            ),
        ];
        statements.extend(Self::append_statements(bot_id, name, product_ids));
        self.sql.exec_batch(&statements).map_err(sql_error)?;

        info!(bot_id, category = name, members = product_ids.len(), "category upserted");
        self.members(bot_id, name)
    }

    /// Append product ids to the end of an existing category. Duplicates are kept.
    pub fn append_to_category(
        &self,
        bot_id: BotId,
        name: &str,
        product_ids: &[String],
    ) -> Result<Vec<String>, ServiceError> {
        let now = now_rfc3339();
        let mut statements = vec![Self::touch_statement(bot_id, name, &now)];
        statements.extend(Self::append_statements(bot_id, name, product_ids));

        self.sql.exec_batch(&statements).map_err(|e| match e {
            SQLError::NoRowsAffected(_) => ServiceError::NotFound(format!("category {bot_id}/{name}")),
            other => sql_error(other),
        })?;
        self.members(bot_id, name)
    }

    pub fn get_category(&self, bot_id: BotId, name: &str) -> Result<Category, ServiceError> {
        if !self.category_exists(bot_id, name)? {
            return Err(ServiceError::NotFound(format!("category {bot_id}/{name}")));
        }
        Ok(Category {
            bot_id,
            name: name.to_string(),
            product_ids: self.members(bot_id, name)?,
        })
    }

    /// All categories of a bot, ordered by name, memberships in list order.
    pub fn list_categories(&self, bot_id: BotId) -> Result<Vec<Category>, ServiceError> {
        let rows = self
            .sql
            .query(
                "SELECT c.name AS name, m.product_id AS product_id \
                 FROM categories c \
                 LEFT JOIN category_members m ON m.bot_id = c.bot_id AND m.category = c.name \
                 WHERE c.bot_id = ?1 ORDER BY c.name ASC, m.position ASC",
                &[Value::Integer(bot_id)],
            )
            .map_err(sql_error)?;

        let mut categories: Vec<Category> = Vec::new();
        for row in &rows {
            let name = required_str(row, "name")?;
            if categories.last().map(|c| c.name != name).unwrap_or(true) {
                categories.push(Category {
                    bot_id,
                    name,
                    product_ids: Vec::new(),
                });
            }
            if let (Some(pid), Some(current)) = (row.get_str("product_id"), categories.last_mut()) {
                current.product_ids.push(pid.to_string());
            }
        }
        Ok(categories)
    }

    pub fn delete_category(&self, bot_id: BotId, name: &str) -> Result<(), ServiceError> {
        let statements = vec![
            Statement::new(
                "DELETE FROM categories WHERE bot_id = ?1 AND name = ?2",
                vec![Value::Integer(bot_id), Value::from(name)],
            )
            .require_rows(),
            Statement::new(
                "DELETE FROM category_members WHERE bot_id = ?1 AND category = ?2",
                vec![Value::Integer(bot_id), Value::from(name)],
            ),
        ];
        self.sql.exec_batch(&statements).map_err(|e| match e {
            SQLError::NoRowsAffected(_) => ServiceError::NotFound(format!("category {bot_id}/{name}")),
            other => sql_error(other),
        })?;

        info!(bot_id, category = name, "category deleted");
        Ok(())
    }

    /// Remove the first occurrence of `product_id` from a category.
    pub fn remove_product_from_category(
        &self,
        bot_id: BotId,
        name: &str,
        product_id: &str,
    ) -> Result<Vec<String>, ServiceError> {
        let now = now_rfc3339();
        let statements = vec![
            Self::touch_statement(bot_id, name, &now),
            Statement::new(
                "DELETE FROM category_members WHERE bot_id = ?1 AND category = ?2 AND position = \
                 (SELECT MIN(position) FROM category_members \
                   WHERE bot_id = ?1 AND category = ?2 AND product_id = ?3)",
                vec![Value::Integer(bot_id), Value::from(name), Value::from(product_id)],
            )
            .require_rows(),
        ];

        self.sql.exec_batch(&statements).map_err(|e| match e {
            SQLError::NoRowsAffected(0) => ServiceError::NotFound(format!("category {bot_id}/{name}")),
            SQLError::NoRowsAffected(_) => {
                ServiceError::NotFound(format!("product {product_id} not in category {name}"))
            }
            other => sql_error(other),
        })?;
        self.members(bot_id, name)
    }
}

fn validate_name(name: &str) -> Result<(), ServiceError> {
    if name.trim().is_empty() {
        return Err(ServiceError::Validation("product name is required".into()));
    }
    Ok(())
}

fn validate_price(price: i64) -> Result<(), ServiceError> {
    if price <= 0 {
        return Err(ServiceError::Validation(format!(
            "price must be positive, got {price}"
        )));
    }
    Ok(())
}

fn row_to_product(row: &Row) -> Result<Product, ServiceError> {
    Ok(Product {
        bot_id: required_i64(row, "bot_id")?,
        product_id: required_str(row, "product_id")?,
        name: required_str(row, "name")?,
        price: required_i64(row, "price")?,
        description: required_str(row, "description")?,
        terms: required_str(row, "terms")?,
        sold: required_i64(row, "sold")?,
        create_at: required_str(row, "create_at")?,
        update_at: required_str(row, "update_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ids, new_product, payloads, test_module};

    #[test]
    fn create_get_and_list() {
        let m = test_module();
        let catalog = m.catalog();
        catalog.create_product(1, new_product("B", 200)).unwrap();
        catalog.create_product(1, new_product("A", 100)).unwrap();
        m.pool().insert(1, "A", &payloads(&["a1", "a2"])).unwrap();

        let view = catalog.product_view(1, "A").unwrap();
        assert_eq!(view.product.price, 100);
        assert_eq!(view.product.sold, 0);
        assert_eq!(view.stock, 2);

        let list = catalog.list_products(1).unwrap();
        let got: Vec<_> = list.iter().map(|v| (v.product.product_id.as_str(), v.stock)).collect();
        assert_eq!(got, vec![("A", 2), ("B", 0)]);
    }

    #[test]
    fn create_validates_and_detects_duplicates() {
        let m = test_module();
        let catalog = m.catalog();
        assert!(matches!(
            catalog.create_product(1, new_product(" ", 10)),
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            catalog.create_product(1, new_product("A", 0)),
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            catalog.create_product(99, new_product("A", 10)),
            Err(ServiceError::NotFound(_))
        ));

        catalog.create_product(1, new_product("A", 10)).unwrap();
        assert!(matches!(
            catalog.create_product(1, new_product("A", 10)),
            Err(ServiceError::Conflict(_))
        ));
    }

    #[test]
    fn edit_fields() {
        let m = test_module();
        let catalog = m.catalog();
        catalog.create_product(1, new_product("A", 10)).unwrap();

        let p = catalog.edit_price(1, "A", 15).unwrap();
        assert_eq!(p.price, 15);
        let p = catalog.edit_name(1, "A", "Spotify Family").unwrap();
        assert_eq!(p.name, "Spotify Family");
        let p = catalog
            .edit_product(1, "A", ProductPatch {
                description: Some("1 month".into()),
                terms: Some("no refunds".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(p.description, "1 month");
        assert_eq!(p.terms, "no refunds");
        assert_eq!(p.price, 15);

        assert!(matches!(catalog.edit_price(1, "A", -1), Err(ServiceError::Validation(_))));
        assert!(matches!(catalog.edit_terms(1, "NOPE", "x"), Err(ServiceError::NotFound(_))));
        assert!(matches!(
            catalog.edit_product(1, "A", ProductPatch::default()),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn record_sold_accumulates() {
        let m = test_module();
        let catalog = m.catalog();
        catalog.create_product(1, new_product("A", 10)).unwrap();
        catalog.record_sold(1, "A", 2).unwrap();
        assert_eq!(catalog.record_sold(1, "A", 3).unwrap().sold, 5);
        assert!(matches!(catalog.record_sold(1, "B", 1), Err(ServiceError::NotFound(_))));
        assert!(matches!(catalog.record_sold(1, "A", 0), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn rename_cascades_to_stock_and_categories() {
        let m = test_module();
        let catalog = m.catalog();
        let pool = m.pool();
        catalog.create_product(1, new_product("A", 10)).unwrap();
        catalog.create_product(1, new_product("C", 10)).unwrap();
        catalog.record_sold(1, "A", 7).unwrap();
        pool.insert(1, "A", &payloads(&["a1", "a2", "a3"])).unwrap();
        pool.consume_one(1, "A", "tx-1").unwrap().unwrap();
        catalog.upsert_category(1, "Streaming", &ids(&["A", "C", "A"])).unwrap();
        catalog.upsert_category(1, "Music", &ids(&["C"])).unwrap();
        let before = pool.count_available(1, "A").unwrap();

        let renamed = catalog.rename_product_id(1, "A", "B").unwrap();
        assert_eq!(renamed.product_id, "B");
        assert_eq!(renamed.sold, 7);

        assert!(!catalog.product_exists(1, "A").unwrap());
        assert_eq!(pool.count_available(1, "A").unwrap(), 0);
        assert_eq!(pool.count_available(1, "B").unwrap(), before);
        assert_eq!(pool.units_by_transaction("tx-1").unwrap()[0].product_id, "B");

        let streaming = catalog.get_category(1, "Streaming").unwrap();
        assert_eq!(streaming.product_ids, ids(&["B", "C", "B"]));
        assert_eq!(catalog.get_category(1, "Music").unwrap().product_ids, ids(&["C"]));
    }

    #[test]
    fn rename_conflicts_and_missing() {
        let m = test_module();
        let catalog = m.catalog();
        catalog.create_product(1, new_product("A", 10)).unwrap();
        catalog.create_product(1, new_product("B", 10)).unwrap();

        assert!(matches!(catalog.rename_product_id(1, "A", "B"), Err(ServiceError::Conflict(_))));
        assert!(matches!(catalog.rename_product_id(1, "A", "A"), Err(ServiceError::Conflict(_))));
        assert!(matches!(catalog.rename_product_id(1, "Z", "Q"), Err(ServiceError::NotFound(_))));
        assert!(matches!(catalog.rename_product_id(1, "A", "  "), Err(ServiceError::Validation(_))));
        assert!(catalog.product_exists(1, "A").unwrap());
    }

    #[test]
    fn rename_is_scoped_to_bot() {
        let m = test_module();
        let catalog = m.catalog();
        catalog.create_product(1, new_product("A", 10)).unwrap();
        catalog.create_product(2, new_product("A", 10)).unwrap();
        m.pool().insert(2, "A", &payloads(&["other-bot"])).unwrap();
        catalog.upsert_category(2, "Cat", &ids(&["A"])).unwrap();

        catalog.rename_product_id(1, "A", "B").unwrap();
        assert!(catalog.product_exists(2, "A").unwrap());
        assert_eq!(m.pool().count_available(2, "A").unwrap(), 1);
        assert_eq!(catalog.get_category(2, "Cat").unwrap().product_ids, ids(&["A"]));
    }

    #[test]
    fn delete_cascades() {
        let m = test_module();
        let catalog = m.catalog();
        let pool = m.pool();
        catalog.create_product(1, new_product("P", 10)).unwrap();
        catalog.create_product(1, new_product("Q", 10)).unwrap();
        pool.insert(1, "P", &payloads(&["p1", "p2"])).unwrap();
        pool.consume_one(1, "P", "tx-1").unwrap().unwrap();
        catalog.upsert_category(1, "All", &ids(&["P", "Q", "P"])).unwrap();

        let msg = catalog.delete_product(1, "P").unwrap();
        assert!(msg.contains("P"));
        assert_eq!(pool.count_available(1, "P").unwrap(), 0);
        assert!(pool.units_by_transaction("tx-1").unwrap().is_empty());
        assert!(matches!(catalog.get_product(1, "P"), Err(ServiceError::NotFound(_))));
        assert_eq!(catalog.get_category(1, "All").unwrap().product_ids, ids(&["Q"]));

        assert!(matches!(catalog.delete_product(1, "P"), Err(ServiceError::NotFound(_))));
    }

    #[test]
    fn upsert_replaces_membership() {
        let m = test_module();
        let catalog = m.catalog();
        let first = catalog.upsert_category(1, "Games", &ids(&["A", "A", "ghost"])).unwrap();
        assert_eq!(first, ids(&["A", "A", "ghost"]));

        let second = catalog.upsert_category(1, "Games", &ids(&["B"])).unwrap();
        assert_eq!(second, ids(&["B"]));

        let empty = catalog.upsert_category(1, "Games", &[]).unwrap();
        assert!(empty.is_empty());
        assert!(matches!(catalog.upsert_category(99, "Games", &[]), Err(ServiceError::NotFound(_))));
    }

    #[test]
    fn create_and_append_categories() {
        let m = test_module();
        let catalog = m.catalog();
        catalog.create_category(1, "VPN", &ids(&["A"])).unwrap();
        assert!(matches!(catalog.create_category(1, "VPN", &[]), Err(ServiceError::Conflict(_))));

        let members = catalog.append_to_category(1, "VPN", &ids(&["B", "A"])).unwrap();
        assert_eq!(members, ids(&["A", "B", "A"]));
        assert!(matches!(
            catalog.append_to_category(1, "Nope", &ids(&["A"])),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn remove_first_occurrence_only() {
        let m = test_module();
        let catalog = m.catalog();
        catalog.upsert_category(1, "Mix", &ids(&["A", "B", "A"])).unwrap();

        let members = catalog.remove_product_from_category(1, "Mix", "A").unwrap();
        assert_eq!(members, ids(&["B", "A"]));

        assert!(matches!(
            catalog.remove_product_from_category(1, "Mix", "Z"),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            catalog.remove_product_from_category(1, "Nope", "A"),
            Err(ServiceError::NotFound(_))
        ));

        // Appends after a removal still land at the end.
        let members = catalog.append_to_category(1, "Mix", &ids(&["C"])).unwrap();
        assert_eq!(members, ids(&["B", "A", "C"]));
    }

    #[test]
    fn list_and_delete_categories() {
        let m = test_module();
        let catalog = m.catalog();
        catalog.upsert_category(1, "b-side", &ids(&["X", "Y"])).unwrap();
        catalog.upsert_category(1, "a-empty", &[]).unwrap();

        let all = catalog.list_categories(1).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "a-empty");
        assert!(all[0].product_ids.is_empty());
        assert_eq!(all[1].product_ids, ids(&["X", "Y"]));

        catalog.delete_category(1, "b-side").unwrap();
        assert!(matches!(catalog.get_category(1, "b-side"), Err(ServiceError::NotFound(_))));
        assert!(matches!(catalog.delete_category(1, "b-side"), Err(ServiceError::NotFound(_))));

        // Recreating starts from an empty list.
        catalog.create_category(1, "b-side", &[]).unwrap();
        assert!(catalog.get_category(1, "b-side").unwrap().product_ids.is_empty());
    }
}
