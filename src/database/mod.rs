use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use std::error::Error;

pub const USERS: &str = "users";
pub const UPLOADS: &str = "uploads";
pub const PARSED_SHEETS: &str = "parsed_sheets";
pub const SHARED_ITEMS: &str = "shared_items";
pub const SHARE_LINKS: &str = "share_links";
pub const TEAMS: &str = "teams";
pub const EXPORTS: &str = "exports";

#[derive(Clone)]
pub struct MongoDB {
    db: Database,
}

impl MongoDB {
    pub async fn new(uri: &str) -> Result<Self, Box<dyn Error>> {
        let mut client_options = mongodb::options::ClientOptions::parse(uri).await?;

        client_options.max_pool_size = Some(20);
        client_options.min_pool_size = Some(5);
        client_options.max_idle_time = Some(std::time::Duration::from_secs(300));

        client_options.connect_timeout = Some(std::time::Duration::from_secs(5));
        client_options.server_selection_timeout = Some(std::time::Duration::from_secs(5));

        let client = Client::with_options(client_options)?;

        let db_name = database_name(uri);
        let db = client.database(db_name);

        // Test connection
        db.list_collection_names().await?;

        let mongodb = Self { db };
        mongodb.ensure_indexes().await?;

        Ok(mongodb)
    }

    async fn ensure_indexes(&self) -> Result<(), Box<dyn Error>> {
        log::info!("🔧 Creating database indexes...");

        self.create_index(USERS, doc! { "user_id": 1 }, true).await;
        self.create_index(USERS, doc! { "email": 1 }, true).await;
        self.create_index(USERS, doc! { "username": 1 }, true).await;

        // file_name is the join key back to the upload directory
        self.create_index(UPLOADS, doc! { "file_name": 1 }, true).await;
        self.create_index(UPLOADS, doc! { "user_id": 1, "uploaded_at": -1 }, false).await;
        // a parse result spans one or more chunk documents
        self.create_index(PARSED_SHEETS, doc! { "file_name": 1, "chunk": 1 }, true).await;

        self.create_index(SHARED_ITEMS, doc! { "owner_id": 1 }, false).await;
        self.create_index(SHARED_ITEMS, doc! { "recipient_id": 1 }, false).await;
        self.create_index(SHARE_LINKS, doc! { "token": 1 }, true).await;
        self.create_index(TEAMS, doc! { "team_id": 1 }, true).await;
        self.create_index(TEAMS, doc! { "owner_id": 1 }, false).await;
        self.create_index(EXPORTS, doc! { "user_id": 1, "created_at": -1 }, false).await;

        log::info!("✅ Database indexes ready");

        Ok(())
    }

    async fn create_index(&self, collection: &str, keys: Document, unique: bool) {
        let index = IndexModel::builder()
            .keys(keys.clone())
            .options(IndexOptions::builder().unique(unique).build())
            .build();

        match self.collection::<Document>(collection).create_index(index).await {
            Ok(_) => log::info!("   ✅ Index created: {}({:?})", collection, keys.keys().collect::<Vec<_>>()),
            Err(e) => log::debug!("   ℹ️  Index already exists: {}", e),
        }
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }
}

/// Unique index violation (E11000).
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == 11000
    )
}

/// Database name from the URI path, e.g. `mongodb://host:27017/excel-analytics?x=y`.
fn database_name(uri: &str) -> &str {
    let without_scheme = uri.split("://").nth(1).unwrap_or(uri);
    without_scheme
        .split_once('/')
        .map(|(_, rest)| rest.split('?').next().unwrap_or(""))
        .filter(|name| !name.is_empty())
        .unwrap_or("excel-analytics")
}
