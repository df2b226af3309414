use thiserror::Error;

#[derive(Error, Debug)]
pub enum SQLError {
    #[error("query error: {0}")]
    Query(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("connection error: {0}")]
    Connection(String),

    /// A UNIQUE / FOREIGN KEY / CHECK constraint rejected the write.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// A guarded statement in a batch matched no rows; the batch was rolled back.
    #[error("statement {0} affected no rows")]
    NoRowsAffected(usize),
}
