use courier::db::{db_kind_from_url, new_message_id, rewrite_sql, DbKind};

#[test]
fn test_db_kind_from_url_sqlite() {
    assert_eq!(db_kind_from_url("sqlite://state.db"), DbKind::Sqlite);
    assert_eq!(db_kind_from_url("SQLite://state.db"), DbKind::Sqlite);
}

#[test]
fn test_db_kind_from_url_postgres() {
    assert_eq!(
        db_kind_from_url("postgres://localhost/courier"),
        DbKind::Postgres
    );
    assert_eq!(
        db_kind_from_url("postgresql://localhost/courier"),
        DbKind::Postgres
    );
}

#[test]
fn test_db_kind_from_url_default_sqlite() {
    assert_eq!(db_kind_from_url("mysql://localhost/courier"), DbKind::Sqlite);
}

#[test]
fn test_rewrite_sql_sqlite() {
    let sql = "SELECT id FROM messages WHERE status = ? AND priority > ?";
    assert_eq!(rewrite_sql(sql, DbKind::Sqlite).as_ref(), sql);
}

#[test]
fn test_rewrite_sql_postgres() {
    let sql = "SELECT id FROM messages WHERE status = ? AND priority > ?";
    assert_eq!(
        rewrite_sql(sql, DbKind::Postgres).as_ref(),
        "SELECT id FROM messages WHERE status = $1 AND priority > $2"
    );
}

#[test]
fn test_rewrite_sql_postgres_join() {
    let sql = "SELECT m.id FROM messages m INNER JOIN reply_handlers h ON h.name = m.reply_handler \
               WHERE m.to_addr = ? AND m.from_addr = ? AND h.allow_indirect_reply = ?";
    assert_eq!(
        rewrite_sql(sql, DbKind::Postgres).as_ref(),
        "SELECT m.id FROM messages m INNER JOIN reply_handlers h ON h.name = m.reply_handler \
         WHERE m.to_addr = $1 AND m.from_addr = $2 AND h.allow_indirect_reply = $3"
    );
}

#[test]
fn test_rewrite_sql_no_placeholders() {
    let sql = "SELECT COUNT(1) FROM messages";
    assert_eq!(rewrite_sql(sql, DbKind::Postgres).as_ref(), sql);
}

#[test]
fn test_new_message_id_is_unique() {
    let a = new_message_id();
    let b = new_message_id();
    assert_ne!(a, b);
    assert_eq!(a.len(), 36);
}
