use crate::config::DatabaseConfig;
use crate::entities::file_records;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::time::Duration;
use tracing::info;

pub async fn setup_database(config: &DatabaseConfig) -> anyhow::Result<DatabaseConnection> {
    let db_url = config.url();

    match &config.url_override {
        Some(_) => info!("📂 Database: DATABASE_URL"),
        None => info!(
            "📂 Database: {}:{}/{} (user {})",
            config.host, config.port, config.name, config.user
        ),
    }

    let mut opt = ConnectOptions::new(&db_url);
    opt.max_connections(50)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    info!("🔄 Running auto-migrations...");

    let stmts = vec![(
        "file_records",
        schema
            .create_table_from_entity(file_records::Entity)
            .if_not_exists()
            .to_owned(),
    )];

    for (name, stmt) in stmts {
        let stmt = builder.build(&stmt);
        db.execute(stmt).await?;
        info!("   - Table '{}' checked/created", name);
    }

    Ok(())
}
