use thiserror::Error as ThisError;

/// Closed error taxonomy for the whole crate. Driver-level faults are
/// caught at the nearest boundary and wrapped with context; the original
/// cause is always preserved for diagnostic chaining.
#[derive(Debug, ThisError)]
pub enum DumpError {
    #[error("failed to connect to the database at {host} with user {user}")]
    Connection {
        host: String,
        user: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("error during backup: {context}")]
    Backup {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("error while restoring the database, statement `{statement}`")]
    Restore {
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("invalid {what}: {value}")]
    InvalidOption { what: &'static str, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DumpError {
    /// Wrap a driver fault raised while introspecting or generating statements.
    pub fn backup(context: impl Into<String>, source: sqlx::Error) -> DumpError {
        DumpError::Backup {
            context: context.into(),
            source,
        }
    }

    /// Wrap a driver fault raised while replaying a statement. The statement
    /// text is truncated so logs stay readable for multi-row INSERTs.
    pub fn restore(statement: &str, source: sqlx::Error) -> DumpError {
        const MAX: usize = 120;
        let trimmed = statement.trim();
        let statement = if trimmed.len() > MAX {
            let cut = trimmed
                .char_indices()
                .take_while(|(i, _)| *i < MAX)
                .map(|(i, c)| i + c.len_utf8())
                .last()
                .unwrap_or(0);
            format!("{}...", &trimmed[..cut])
        } else {
            trimmed.to_string()
        };
        DumpError::Restore { statement, source }
    }
}
