use async_tables::{
    Callback, CallbackTableService, ContinuationToken, Entity, Error, MemoryTableService,
    Promisified, QueryPage, ServiceError, TableBatch, TableQuery, TableService,
};

/// Callback client that completes every call from a separate thread with a
/// fixed error, or forgets the callback entirely.
struct FailingClient {
    error: Option<ServiceError>,
}

impl FailingClient {
    fn complete<T: Send + 'static>(&self, callback: Callback<T>) {
        if let Some(err) = self.error.clone() {
            std::thread::spawn(move || callback(Err(err.into())));
        }
    }
}

impl CallbackTableService for FailingClient {
    fn query_entities(
        &self,
        _: &str,
        _: Option<&TableQuery>,
        _: Option<&ContinuationToken>,
        callback: Callback<QueryPage>,
    ) {
        self.complete(callback);
    }

    fn retrieve_entity(&self, _: &str, _: &str, _: &str, callback: Callback<Entity>) {
        self.complete(callback);
    }

    fn insert_entity(&self, _: &str, _: &Entity, callback: Callback<Entity>) {
        self.complete(callback);
    }

    fn insert_or_replace_entity(&self, _: &str, _: &Entity, callback: Callback<Entity>) {
        self.complete(callback);
    }

    fn replace_entity(&self, _: &str, _: &Entity, callback: Callback<Entity>) {
        self.complete(callback);
    }

    fn delete_entity(&self, _: &str, _: &Entity, callback: Callback<()>) {
        self.complete(callback);
    }

    fn create_table_if_not_exists(&self, _: &str, callback: Callback<bool>) {
        self.complete(callback);
    }

    fn does_table_exist(&self, _: &str, callback: Callback<bool>) {
        self.complete(callback);
    }

    fn execute_batch(&self, _: &str, _: &TableBatch, callback: Callback<()>) {
        self.complete(callback);
    }
}

fn failing(error: ServiceError) -> Promisified<FailingClient> {
    Promisified::new(FailingClient { error: Some(error) })
}

#[tokio::test]
async fn test_retrieve_missing_entity_resolves_none() {
    let client = Promisified::new(MemoryTableService::new());
    client.create_table_if_not_exists("t").await.unwrap();

    assert_eq!(client.retrieve_entity("t", "p", "r").await, Ok(None));
}

#[tokio::test]
async fn test_retrieve_404_from_client_resolves_none() {
    let client = failing(ServiceError::not_found("ResourceNotFound", "missing"));

    assert_eq!(client.retrieve_entity("t", "p", "r").await, Ok(None));
}

#[tokio::test]
async fn test_retrieve_other_errors_propagate() {
    let forbidden = ServiceError::new("denied").with_status(403);
    let client = failing(forbidden.clone());

    let err = client.retrieve_entity("t", "p", "r").await.unwrap_err();

    assert_eq!(err, Error::Service(forbidden));
}

#[tokio::test]
async fn test_404_only_special_for_retrieve() {
    let missing = ServiceError::not_found("ResourceNotFound", "missing");
    let client = failing(missing.clone());

    let err = client
        .delete_entity("t", &Entity::new("p", "r"))
        .await
        .unwrap_err();
    assert_eq!(err.service(), Some(&missing));
}

#[tokio::test]
async fn test_every_operation_passes_errors_unchanged() {
    let reported = ServiceError::new("Server busy")
        .with_status(503)
        .with_code("ServerBusy");
    let client = failing(reported.clone());
    let entity = Entity::new("p", "r");
    let expected = Error::Service(reported);

    assert_eq!(client.query_entities("t", None, None).await.unwrap_err(), expected);
    assert_eq!(client.insert_entity("t", &entity).await.unwrap_err(), expected);
    assert_eq!(
        client.insert_or_replace_entity("t", &entity).await.unwrap_err(),
        expected
    );
    assert_eq!(client.replace_entity("t", &entity).await.unwrap_err(), expected);
    assert_eq!(client.delete_entity("t", &entity).await.unwrap_err(), expected);
    assert_eq!(client.create_table_if_not_exists("t").await.unwrap_err(), expected);
    assert_eq!(client.does_table_exist("t").await.unwrap_err(), expected);
    assert_eq!(
        client
            .execute_batch("t", &TableBatch::new())
            .await
            .unwrap_err(),
        expected
    );
}

#[tokio::test]
async fn test_forgotten_callback_is_reported() {
    let client = Promisified::new(FailingClient { error: None });

    let err = client.does_table_exist("t").await.unwrap_err();

    assert_eq!(
        err,
        Error::CallbackDropped {
            operation: "does_table_exist"
        }
    );
}

#[tokio::test]
async fn test_crud_round_trip_through_adapter() {
    let client = Promisified::new(MemoryTableService::new());
    assert!(client.create_table_if_not_exists("t").await.unwrap());
    assert!(!client.create_table_if_not_exists("t").await.unwrap());
    assert!(client.does_table_exist("t").await.unwrap());

    let entity = Entity::new("p", "r").with("name", "first");
    client.insert_entity("t", &entity).await.unwrap();
    client
        .replace_entity("t", &Entity::new("p", "r").with("name", "second"))
        .await
        .unwrap();

    let stored = client.retrieve_entity("t", "p", "r").await.unwrap().unwrap();
    assert_eq!(stored.get("name").and_then(|v| v.as_str()), Some("second"));

    client.delete_entity("t", &entity).await.unwrap();
    assert_eq!(client.retrieve_entity("t", "p", "r").await, Ok(None));
}
