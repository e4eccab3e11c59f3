use std::sync::Arc;

use crate::{config::Config, db::Database};

pub struct AppState {
    pub config: Config,
    pub db: Database,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        let config = Config::load();
        let db = Database::new(&config.db_path).expect("Database misconfigured!");

        Arc::new(Self { config, db })
    }
}
