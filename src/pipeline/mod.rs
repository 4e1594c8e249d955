pub mod convert;
pub mod discovery;
pub mod state;
pub mod worker;

pub use state::SharedStreamState;

use crate::schema::TableSchemas;

/// Everything C3/C4/C5 need to know about the source table they're
/// replicating, bundled once at startup alongside the stream identifier.
#[derive(Clone)]
pub struct TableContext {
    pub schemas: TableSchemas,
}

impl TableContext {
    pub fn source_table(&self) -> &str {
        &self.schemas.source.table
    }

    pub fn target_table(&self) -> &str {
        &self.schemas.target.table
    }
}
