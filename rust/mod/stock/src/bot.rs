//! Bot existence checks.
//!
//! The stock module does not own bots. It only needs to know whether a
//! bot id is live before creating products or categories under it; the
//! concrete directory is injected at startup.

use std::sync::Arc;

use stockroom_core::{ServiceError, now_rfc3339};
use stockroom_sql::{Row, SQLStore, Value};

use crate::model::{Bot, BotId};
use crate::schema::{self, required_i64, required_str, sql_error};

/// Pluggable bot existence check.
pub trait BotDirectory: Send + Sync {
    fn exists(&self, bot_id: BotId) -> Result<bool, ServiceError>;
}

/// A directory that accepts every bot id. Used for testing and for
/// embedding where bots are validated upstream.
pub struct AnyBot;

impl BotDirectory for AnyBot {
    fn exists(&self, _bot_id: BotId) -> Result<bool, ServiceError> {
        Ok(true)
    }
}

/// Bots persisted in the `bots` table.
pub struct SqlBotDirectory {
    sql: Arc<dyn SQLStore>,
}

impl SqlBotDirectory {
    pub fn new(sql: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        schema::init_schema(sql.as_ref())?;
        Ok(Self { sql })
    }

    /// Register a bot. Fails with `Conflict` if the id is taken.
    pub fn register(&self, bot_id: BotId, name: &str) -> Result<Bot, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("bot name is required".into()));
        }

        let bot = Bot {
            bot_id,
            name: name.to_string(),
            create_at: now_rfc3339(),
        };
        self.sql
            .exec(
                "INSERT INTO bots (bot_id, name, create_at) VALUES (?1, ?2, ?3)",
                &[
                    Value::Integer(bot.bot_id),
                    Value::from(bot.name.as_str()),
                    Value::from(bot.create_at.as_str()),
                ],
            )
            .map_err(|e| match sql_error(e) {
                ServiceError::Conflict(_) => {
                    ServiceError::Conflict(format!("bot {bot_id} already registered"))
                }
                other => other,
            })?;

        Ok(bot)
    }

    pub fn get(&self, bot_id: BotId) -> Result<Bot, ServiceError> {
        let rows = self
            .sql
            .query(
                "SELECT bot_id, name, create_at FROM bots WHERE bot_id = ?1",
                &[Value::Integer(bot_id)],
            )
            .map_err(sql_error)?;

        let row = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound(format!("bot {bot_id}")))?;
        row_to_bot(row)
    }
}

impl BotDirectory for SqlBotDirectory {
    fn exists(&self, bot_id: BotId) -> Result<bool, ServiceError> {
        let rows = self
            .sql
            .query(
                "SELECT 1 AS found FROM bots WHERE bot_id = ?1",
                &[Value::Integer(bot_id)],
            )
            .map_err(sql_error)?;
        Ok(!rows.is_empty())
    }
}

fn row_to_bot(row: &Row) -> Result<Bot, ServiceError> {
    Ok(Bot {
        bot_id: required_i64(row, "bot_id")?,
        name: required_str(row, "name")?,
        create_at: required_str(row, "create_at")?,
    })
}
