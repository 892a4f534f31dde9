use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Error, NodeStatusRecord, Store};

type Key = (String, String);

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
  records: RwLock<BTreeMap<Key, NodeStatusRecord>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn get_record(
    &self,
    task_id: &str,
    node_id: &str,
  ) -> Result<Option<NodeStatusRecord>, Error> {
    let records = self.records.read().await;
    Ok(
      records
        .get(&(task_id.to_string(), node_id.to_string()))
        .cloned(),
    )
  }

  async fn list_records(&self, task_id: &str) -> Result<Vec<NodeStatusRecord>, Error> {
    let records = self.records.read().await;
    Ok(
      records
        .values()
        .filter(|r| r.task_id == task_id)
        .cloned()
        .collect(),
    )
  }

  async fn save_records(&self, batch: &[NodeStatusRecord]) -> Result<(), Error> {
    let mut records = self.records.write().await;
    for record in batch {
      records.insert(
        (record.task_id.clone(), record.node_id.clone()),
        record.clone(),
      );
    }
    Ok(())
  }
}
