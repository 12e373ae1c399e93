use formledger_storage::SqliteStorage;

use crate::TestWorkspace;

/// Several independent connections on one store file, one per simulated
/// writer. Each can be moved to its own thread.
pub struct TestWriters {
    writers: Vec<SqliteStorage>,
}

impl TestWriters {
    /// The workspace store must already be migrated (open it once with
    /// [`TestWorkspace::storage`] first).
    pub fn open(workspace: &TestWorkspace, count: usize) -> Result<Self, Box<dyn std::error::Error>> {
        let mut writers = Vec::with_capacity(count);
        for _ in 0..count {
            writers.push(workspace.attach()?);
        }
        Ok(Self { writers })
    }

    pub fn into_inner(self) -> Vec<SqliteStorage> {
        self.writers
    }
}
