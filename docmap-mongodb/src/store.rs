use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Document, doc};
use mongodb::{
    Client, Collection as MongoCollection, Database,
    error::Error as MongoError,
    options::{
        CountOptions as MongoCountOptions, FindOneAndUpdateOptions as MongoFindOneAndUpdateOptions,
        FindOneOptions as MongoFindOneOptions, FindOptions as MongoFindOptions,
        ReturnDocument as MongoReturnDocument,
    },
};
use tracing::{error, info, warn};

use docmap_core::{
    backend::{
        CollectionHandle, ConnectionProvider, ConnectionProviderBuilder, ConnectionStatus, CountOptions,
        DeleteOutcome, FindOneAndUpdateOptions, FindOneOptions, FindOptions, InsertOneOutcome,
        ReturnDocument, UpdateOptions, UpdateOutcome,
    },
    error::{DocumentError, DocumentResult},
};

use crate::config::MongoConfig;

fn backend_error(err: MongoError) -> DocumentError {
    DocumentError::Backend(err.to_string())
}

fn is_replacement(update: &Document) -> bool {
    update.keys().next().is_some_and(|key| !key.starts_with('$'))
}


/// A connected MongoDB database.
#[derive(Debug, Clone)]
pub struct MongoProvider {
    client: Client,
    database: Database,
}

impl MongoProvider {
    pub fn new(client: Client, database: &str) -> Self {
        Self {
            database: client.database(database),
            client,
        }
    }

    pub fn builder(uri: &str) -> MongoProviderBuilder {
        MongoProviderBuilder::new(uri)
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    async fn ping(&self) -> Result<Document, MongoError> {
        self.database.run_command(doc! { "ping": 1 }).await
    }
}

#[async_trait]
impl ConnectionProvider for MongoProvider {
    type Handle = MongoCollectionHandle;

    fn collection_handle(&self, name: &str) -> Self::Handle {
        MongoCollectionHandle {
            collection: self.database.collection(name),
        }
    }

    async fn status(&self) -> ConnectionStatus {
        match self.ping().await {
            Ok(_) => ConnectionStatus::Connected,
            Err(_) => ConnectionStatus::Disconnected,
        }
    }

    async fn shutdown(self) -> DocumentResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}


/// Connects a [`MongoProvider`], retrying the initial ping.
#[derive(Debug, Clone)]
pub struct MongoProviderBuilder {
    config: MongoConfig,
}

impl MongoProviderBuilder {
    pub fn new(uri: &str) -> Self {
        Self {
            config: MongoConfig::new(uri),
        }
    }

    pub fn database(mut self, database: &str) -> Self {
        self.config.database = Some(database.to_string());
        self
    }

    pub fn connection_retry_wait(mut self, seconds: u64) -> Self {
        self.config.connection_retry_wait = seconds;
        self
    }

    pub fn connection_retry_max(mut self, attempts: u32) -> Self {
        self.config.connection_retry_max = attempts;
        self
    }

    pub fn cert_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config.cert_file = Some(path.into());
        self
    }

    pub fn production(mut self, production: bool) -> Self {
        self.config.production = production;
        self
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = Some(name.into());
        self
    }

    pub fn config(&self) -> &MongoConfig {
        &self.config
    }
}

impl From<MongoConfig> for MongoProviderBuilder {
    fn from(config: MongoConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionProviderBuilder for MongoProviderBuilder {
    type Provider = MongoProvider;

    /// Builds the client and pings the server until it answers or the attempts run out.
    async fn connect(self) -> DocumentResult<Self::Provider> {
        let options = self.config.to_client_options().await?;
        let database = self.config.database_name(&options)?;
        let attempts = self.config.retry_attempts();

        info!(database = %database, production = self.config.production, "Connecting to MongoDB");

        let client = Client::with_options(options)
            .map_err(|e| DocumentError::Initialization(format!("failed to create client: {e}")))?;
        let provider = MongoProvider::new(client, &database);

        let mut attempt = 1;
        loop {
            match provider.ping().await {
                Ok(_) => break,
                Err(err) if attempt < attempts => {
                    warn!(
                        attempt,
                        attempts,
                        error = %err,
                        "MongoDB connection failed, retrying in {}s",
                        self.config.connection_retry_wait,
                    );
                    tokio::time::sleep(self.config.retry_wait()).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(attempts, error = %err, "Could not connect to MongoDB");
                    return Err(DocumentError::Initialization(err.to_string()));
                }
            }
        }

        info!(database = %database, "MongoDB connection established");

        Ok(provider)
    }
}


/// A handle to one MongoDB collection.
#[derive(Debug, Clone)]
pub struct MongoCollectionHandle {
    collection: MongoCollection<Document>,
}

#[async_trait]
impl CollectionHandle for MongoCollectionHandle {
    fn name(&self) -> &str {
        self.collection.name()
    }

    async fn find_one(&self, filter: Document, options: FindOneOptions) -> DocumentResult<Option<Document>> {
        let mut find_options = MongoFindOneOptions::default();
        find_options.projection = options.projection;
        find_options.sort = options.sort;

        self.collection
            .find_one(filter)
            .with_options(find_options)
            .await
            .map_err(backend_error)
    }

    async fn find(&self, filter: Document, options: FindOptions) -> DocumentResult<Vec<Document>> {
        let mut find_options = MongoFindOptions::default();
        find_options.projection = options.projection;
        find_options.sort = options.sort;
        find_options.skip = options.skip;
        find_options.limit = options.limit;

        self.collection
            .find(filter)
            .with_options(find_options)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> DocumentResult<Vec<Document>> {
        self.collection
            .aggregate(pipeline)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn insert_one(&self, document: Document) -> DocumentResult<InsertOneOutcome> {
        let result = self
            .collection
            .insert_one(document)
            .await
            .map_err(backend_error)?;

        Ok(InsertOneOutcome {
            inserted_id: result.inserted_id,
            inserted_count: 1,
        })
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentResult<UpdateOutcome> {
        let result = if is_replacement(&update) {
            self.collection
                .replace_one(filter, update)
                .upsert(options.upsert)
                .await
        } else {
            self.collection
                .update_one(filter, update)
                .upsert(options.upsert)
                .await
        }
        .map_err(backend_error)?;

        Ok(UpdateOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn delete_one(&self, filter: Document) -> DocumentResult<DeleteOutcome> {
        let result = self
            .collection
            .delete_one(filter)
            .await
            .map_err(backend_error)?;

        Ok(DeleteOutcome {
            deleted_count: result.deleted_count,
        })
    }

    async fn count_documents(&self, filter: Document, options: CountOptions) -> DocumentResult<u64> {
        let mut count_options = MongoCountOptions::default();
        count_options.skip = options.skip;
        count_options.limit = options.limit;

        self.collection
            .count_documents(filter)
            .with_options(count_options)
            .await
            .map_err(backend_error)
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> DocumentResult<Option<Document>> {
        let mut update_options = MongoFindOneAndUpdateOptions::default();
        update_options.return_document = Some(match options.return_document {
            ReturnDocument::Before => MongoReturnDocument::Before,
            ReturnDocument::After => MongoReturnDocument::After,
        });
        update_options.upsert = Some(options.upsert);
        update_options.projection = options.projection;
        update_options.sort = options.sort;

        self.collection
            .find_one_and_update(filter, update)
            .with_options(update_options)
            .await
            .map_err(backend_error)
    }
}
