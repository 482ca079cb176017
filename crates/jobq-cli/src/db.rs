//! Database path resolution (spec §6: `--db` flag, `JOBQ_DB_PATH` env var,
//! `./jobq.db` default).

use anyhow::Result;
use jobq_core::Store;

pub fn resolve_path(flag: Option<&str>) -> String {
    if let Some(path) = flag {
        return path.to_string();
    }
    if let Ok(path) = std::env::var("JOBQ_DB_PATH") {
        return path;
    }
    "jobq.db".to_string()
}

pub async fn connect(flag: Option<&str>) -> Result<Store> {
    let path = resolve_path(flag);
    let store = Store::connect(&path).await?;
    Ok(store)
}
