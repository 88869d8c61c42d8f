//! File-backed pool: schema creation, idempotent migration, cascade delete.

use chrono::Utc;

use keyshop::db::{self, queries};
use keyshop::models::KeyRole;

#[test]
fn reopening_a_database_keeps_data_and_remigrates_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keyshop.db");
    let path = path.to_str().unwrap();

    let expires_at = Utc::now().timestamp() + 1000;
    {
        let pool = db::new_pool(path).unwrap();
        let conn = pool.get().unwrap();
        queries::create_key(
            &conn,
            &queries::NewKey {
                key: "AXSTOOLS-DB-0001".to_string(),
                role: KeyRole::Normal,
                expires_at,
                max_devices: 2,
            },
        )
        .unwrap();
        queries::bind_device(&conn, "AXSTOOLS-DB-0001", "hw-1", Some("alice_rbx")).unwrap();
    }

    // Second open runs the migration again against the existing schema.
    let pool = db::new_pool(path).unwrap();
    let conn = pool.get().unwrap();
    let key = queries::get_key(&conn, "AXSTOOLS-DB-0001").unwrap().unwrap();
    assert_eq!(key.expires_at, expires_at);
    assert_eq!(key.hwids, vec!["hw-1".to_string()]);
    assert_eq!(key.registered_users[0].username, "alice_rbx");
}

#[test]
fn deleting_a_key_cascades_to_its_device_bindings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keyshop.db");

    let pool = db::new_pool(path.to_str().unwrap()).unwrap();
    let conn = pool.get().unwrap();
    queries::create_key(
        &conn,
        &queries::NewKey {
            key: "AXSTOOLS-DB-0002".to_string(),
            role: KeyRole::Free,
            expires_at: Utc::now().timestamp() + 1000,
            max_devices: 1,
        },
    )
    .unwrap();
    queries::bind_device(&conn, "AXSTOOLS-DB-0002", "hw-1", None).unwrap();

    assert!(queries::delete_key(&conn, "AXSTOOLS-DB-0002").unwrap());
    let orphans: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM key_devices WHERE key = 'AXSTOOLS-DB-0002'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(orphans, 0);
}
