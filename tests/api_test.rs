mod helpers;

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use strata::api;
use strata::config::{ApiKey, StrataConfig};
use strata::schema::manager::SchemaManager;
use strata::server::{self, AppContext};

use helpers::*;

struct TestServer {
    base: String,
    client: reqwest::Client,
    key: Uuid,
    read_only_key: Uuid,
    ctx: Arc<AppContext>,
}

impl TestServer {
    async fn start() -> Self {
        let key = Uuid::now_v7();
        let read_only_key = Uuid::now_v7();
        let mut config = StrataConfig::default();
        config.server.hostname = "node-a".into();
        config.auth.keys = vec![
            ApiKey {
                key,
                token: "rw-token".into(),
                write: true,
                expires_unix: -1,
            },
            ApiKey {
                key: read_only_key,
                token: "ro-token".into(),
                write: false,
                expires_unix: -1,
            },
        ];

        let ctx = Arc::new(
            server::assemble(
                config,
                test_connector(),
                SchemaManager::in_memory(),
                sample_schema(),
                solo(),
            )
            .await,
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = api::router(Arc::clone(&ctx));
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            key,
            read_only_key,
            ctx,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("X-API-KEY", self.key.to_string())
            .header("X-API-TOKEN", "rw-token")
    }

    async fn post_batch(&self, kind: &str, body: Value) -> reqwest::Response {
        self.authed(self.client.post(self.url(&format!("/v1/batching/{kind}"))))
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

fn city_json(name: &str) -> Value {
    json!({"@context": "http://example.org", "@class": "City", "schema": {"name": name}})
}

#[tokio::test]
async fn batch_then_read_back() {
    let server = TestServer::start().await;

    let response = server
        .post_batch(
            "things",
            json!({"things": [city_json("Utrecht"), city_json("Breda")], "fields": ["ALL"]}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let items: Vec<Value> = response.json().await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["schema"]["name"], "Utrecht");
    assert_eq!(items[1]["schema"]["name"], "Breda");
    assert_eq!(items[0]["result"]["status"], "SUCCESS");
    assert_eq!(items[0]["lastUpdateTimeUnix"], 0);
    assert_eq!(items[0]["key"]["locationUrl"], "node-a");

    let id = items[0]["thingId"].as_str().unwrap();
    let response = server
        .authed(server.client.get(server.url(&format!("/v1/things/{id}"))))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let object: Value = response.json().await.unwrap();
    assert_eq!(object["@class"], "City");
    assert_eq!(object["thingId"], id);

    // Things are not actions.
    let response = server
        .authed(server.client.get(server.url(&format!("/v1/actions/{id}"))))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn batch_rejections() {
    let server = TestServer::start().await;

    let response = server.post_batch("things", json!({"things": []})).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"][0]["message"].is_string());

    let response = server
        .client
        .post(server.url("/v1/batching/things"))
        .json(&json!({"things": [city_json("x")]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = server
        .client
        .post(server.url("/v1/batching/things"))
        .header("X-API-KEY", server.read_only_key.to_string())
        .header("X-API-TOKEN", "ro-token")
        .json(&json!({"things": [city_json("x")]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let handle = server.ctx.lock.read().await;
    assert_eq!(
        strata::lock::SchemaView::connector(&handle)
            .count_objects(strata::schema::ObjectKind::Thing)
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn deferred_batch_is_readable_after_drain() {
    let server = TestServer::start().await;

    let response = server
        .post_batch(
            "things",
            json!({"things": [city_json("Zwolle")], "async": true, "fields": ["thingId"]}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let items: Vec<Value> = response.json().await.unwrap();
    let status = items[0]["result"]["status"].as_str().unwrap();
    assert!(status == "PENDING" || status == "SUCCESS", "got {status}");
    assert!(items[0].get("schema").is_none());

    // The read waits behind the deferred write.
    let id = items[0]["thingId"].as_str().unwrap();
    let response = server
        .authed(server.client.get(server.url(&format!("/v1/things/{id}"))))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn schema_routes() {
    let server = TestServer::start().await;

    let response = server.client.get(server.url("/v1/schema")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = server
        .authed(server.client.post(server.url("/v1/schema/things")))
        .json(&json!({"class": "Harbour", "properties": [{"name": "city", "@dataType": ["City"]}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .authed(server.client.post(server.url("/v1/schema/actions")))
        .json(&json!({"class": "Harbour"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let schema: Value = server
        .authed(server.client.get(server.url("/v1/schema")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let classes: Vec<&str> = schema["things"]["classes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["class"].as_str().unwrap())
        .collect();
    assert_eq!(classes, vec!["City", "Country", "Harbour"]);

    let meta: Value = server
        .authed(server.client.get(server.url("/v1/meta")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(meta["hostname"], "node-a");
    assert_eq!(meta["network"], "solo");
    let catalog_classes = meta["catalog"]["classes"].as_array().unwrap();
    assert!(catalog_classes.iter().any(|c| c["class"] == "Harbour"));
}

#[tokio::test]
async fn p2p_routes_on_a_solo_node() {
    let server = TestServer::start().await;

    let response = server.client.get(server.url("/v1/p2p/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .client
        .put(server.url("/v1/p2p/genesis"))
        .json(&json!([{"id": Uuid::now_v7(), "name": "b", "uri": "http://b:8080"}]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let published: Value = server
        .client
        .get(server.url("/v1/p2p/schema"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(published["hash"], sample_schema().hash());
    assert!(published["schema"]["actions"]["classes"].is_array());
}
