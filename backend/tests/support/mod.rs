use backend::{auth::Hasher, db::Db, web::Services};
use tempfile::TempDir;

/// Services backed by a throwaway database. Keep the `TempDir` alive for
/// the duration of the test.
pub fn services() -> (TempDir, Services) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("api.sqlite3");
    let db = Db::connect(path.to_str().unwrap(), 4).unwrap();
    let services = Services::new(db, Hasher::new(1_000)).unwrap();
    (dir, services)
}
