//! Migration engine behavior against a real database when `DATABASE_URL` is
//! set; a no-op otherwise.

use wfo_store_pg::migrations::{
    applied_migrations, parse_migration_file, pending_migrations, rollback_migration, run_migration, MigrationOutcome,
};
use wfo_store_pg::{build_pool, DbConfig};

fn maybe_conn() -> Option<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>> {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("DATABASE_URL not set - skipping migration engine integration test");
        return None;
    }
    let cfg = DbConfig::from_env();
    let pool = build_pool(&cfg).expect("build pool");
    Some(pool.get().expect("checkout connection"))
}

#[test]
fn applying_the_same_migration_twice_is_a_no_op_second_time() {
    let Some(mut conn) = maybe_conn() else { return };
    let path = std::path::Path::new("../migrations/20240101000000_init_schema.sql");
    let migration = parse_migration_file(path).unwrap();

    let first = run_migration(&mut conn, &migration).unwrap();
    let second = run_migration(&mut conn, &migration).unwrap();

    assert_eq!(first, MigrationOutcome::Applied);
    assert_eq!(second, MigrationOutcome::AlreadyApplied);

    let applied = applied_migrations(&mut conn).unwrap();
    assert_eq!(applied.iter().filter(|m| m.id == migration.id).count(), 1);

    rollback_migration(&mut conn, &migration.id).unwrap();
    let pending = pending_migrations(&mut conn, std::slice::from_ref(&migration)).unwrap();
    assert_eq!(pending.len(), 1);
}
