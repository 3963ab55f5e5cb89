use sqlx::{sqlite::{SqlitePoolOptions, SqliteConnectOptions}, SqlitePool};
use std::str::FromStr;

pub async fn init_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let connect_opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_opts)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            age INTEGER NOT NULL,
            birth_date TEXT NOT NULL,
            address TEXT NOT NULL,
            flat_ids TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flats (
            id TEXT PRIMARY KEY,
            square REAL NOT NULL,
            price REAL NOT NULL,
            currency TEXT NOT NULL DEFAULT 'GEL',
            street TEXT,
            city TEXT,
            state TEXT,
            zip TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(&pool)
    .await?;

    // Legacy free-text location, kept for rows imported from the old data
    // shape; backfilled into street on read/update.
    let _ = sqlx::query("ALTER TABLE flats ADD COLUMN location TEXT;")
        .execute(&pool)
        .await;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flat_images (
            id TEXT PRIMARY KEY,
            flat_id TEXT NOT NULL,
            url TEXT NOT NULL,
            filename TEXT NOT NULL,
            size INTEGER NOT NULL,
            content_type TEXT NOT NULL,
            backend TEXT NOT NULL CHECK(backend IN ('local', 'remote')),
            provider_id TEXT,
            delete_url TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(flat_id) REFERENCES flats(id)
        );
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_flats (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            flat_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(user_id, flat_id),
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(flat_id) REFERENCES flats(id)
        );
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT,
            price REAL NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS questions (
            id TEXT PRIMARY KEY,
            question_id INTEGER,
            active INTEGER NOT NULL DEFAULT 1,
            category_id INTEGER,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS question_translations (
            id TEXT PRIMARY KEY,
            question_ref TEXT NOT NULL,
            language_id INTEGER NOT NULL,
            question TEXT NOT NULL,
            answer TEXT NOT NULL,
            UNIQUE(question_ref, language_id),
            FOREIGN KEY(question_ref) REFERENCES questions(id)
        );
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS info_cards (
            id TEXT PRIMARY KEY,
            info_card_id INTEGER NOT NULL UNIQUE,
            active INTEGER NOT NULL DEFAULT 1,
            image TEXT,
            category_ids TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS info_card_details (
            id TEXT PRIMARY KEY,
            card_ref TEXT NOT NULL,
            language_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            subtitle TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            UNIQUE(card_ref, language_id),
            FOREIGN KEY(card_ref) REFERENCES info_cards(id)
        );
        "#,
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

/// SQLite reports unique-index violations only through the error message.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.message().contains("UNIQUE constraint failed"),
        _ => false,
    }
}
