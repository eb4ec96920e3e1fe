use crate::database::Database;
use crate::modules::watchdog::database::WatchdogDatabase;

pub struct Databases {
    pub watchdog: Database<WatchdogDatabase>,
}

impl Databases {
    pub async fn default() -> Result<Self, crate::database::DbError> {
        Ok(Self {
            watchdog: Database::new("data/watchdog.db").await?,
        })
    }
}
