use crate::{
    database::{Database, DbError},
    default_struct,
};
use serde::{Deserialize, Serialize};

default_struct! {
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    pub enabled: bool = true,
    pub idle_timeout_secs: u64 = 1800,
    pub poll_interval_secs: u64 = 10,
}
}

#[derive(Default, Serialize, Deserialize, Clone, Debug)]
pub struct WatchdogDatabase {
    pub config: Option<WatchdogConfig>,
}

impl Database<WatchdogDatabase> {
    pub async fn get_config(&self) -> Option<WatchdogConfig> {
        self.read(|db| db.config).await
    }

    pub async fn save_config(&self, config: WatchdogConfig) -> Result<(), DbError> {
        self.transaction(|db| {
            db.config = Some(config);
            Ok(())
        })
        .await
    }
}
