use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use docroute::routes::{Handler, Method, Reply, RouteRequest};
use docroute::RouteTable;
use serde_json::Value;

use crate::AppState;

/// Configure the fixed routes, then every synthesized resource route.
pub fn configure(cfg: &mut web::ServiceConfig, table: &RouteTable) {
    cfg.route("/ping", web::get().to(ping))
        .service(
            web::scope("/api")
                .route("/routes", web::get().to(collection_routes))
                .route("/routes/table", web::get().to(route_table))
                .route("/singletons", web::get().to(singleton_routes)),
        );

    for route in table.routes() {
        let handler = route.handler.clone();
        let method = match route.method {
            Method::Get => web::get(),
            Method::Post => web::post(),
            Method::Put => web::put(),
            Method::Delete => web::delete(),
        };
        cfg.route(
            &route.template.raw,
            method.to(move |req: HttpRequest, body: web::Bytes| {
                let handler = handler.clone();
                async move { serve(handler, req, body).await }
            }),
        );
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn reply_response(reply: Reply) -> HttpResponse {
    let status =
        StatusCode::from_u16(reply.status.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = HttpResponse::build(status);
    match reply.body {
        Some(body) => builder.json(body),
        None => builder.finish(),
    }
}

fn parse_body(body: &[u8]) -> Result<Option<Value>, HttpResponse> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body).map(Some).map_err(|e| {
        HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Invalid JSON body: {e}")
        }))
    })
}

async fn serve(handler: Handler, req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let params = req
        .match_info()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    reply_response(handler(RouteRequest { params, body }).await)
}

// ── Fixed routes ────────────────────────────────────────────────────

async fn ping() -> HttpResponse {
    HttpResponse::Ok().content_type("text/plain").body("pong")
}

async fn collection_routes(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.table.collection_keys())
}

async fn singleton_routes(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.table.singleton_keys())
}

async fn route_table(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.table.describe())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use docroute::migration::migrate;
    use docroute::{FileStore, Store, StoreOptions, TreeStore};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn setup_test_state(seed: Value) -> (TempDir, web::Data<AppState>) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("db.json");
        std::fs::write(&path, serde_json::to_vec(&seed).unwrap()).unwrap();

        let adapter = FileStore::open(&path).await.unwrap();
        let store = Store::open(Arc::new(adapter), StoreOptions::default())
            .await
            .unwrap();
        let table = RouteTable::build(&store);
        (tmp, web::Data::new(AppState { table }))
    }

    macro_rules! test_app {
        ($state:expr) => {{
            let state = $state.clone();
            test::init_service(
                App::new()
                    .app_data(state.clone())
                    .configure(|cfg| configure(cfg, &state.table)),
            )
            .await
        }};
    }

    #[actix_web::test]
    async fn test_ping() {
        let (_tmp, state) = setup_test_state(json!({})).await;
        let app = test_app!(state);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "pong");
    }

    #[actix_web::test]
    async fn test_api_routes_lists_collections() {
        let (_tmp, state) = setup_test_state(json!({
            "users": [],
            "orders": [{"id": 1}],
            "settings": {},
            "version": 3,
        }))
        .await;
        let app = test_app!(state);

        let body: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/routes").to_request())
                .await;
        assert_eq!(body, json!(["users", "orders"]));

        let body: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/api/singletons").to_request(),
        )
        .await;
        assert_eq!(body, json!(["settings"]));

        let resp = test::call_service(&app, test::TestRequest::get().uri("/version").to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_collection_crud_over_http() {
        let (_tmp, state) = setup_test_state(json!({ "users": [{"id": 1, "name": "A"}] })).await;
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/users")
            .set_json(json!({"name": "B"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(resp).await;
        let id = created["id"].as_str().unwrap().to_string();

        let fetched: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri(&format!("/users/{id}")).to_request(),
        )
        .await;
        assert_eq!(fetched, created);

        let req = test::TestRequest::put()
            .uri("/users/1")
            .set_json(json!({"name": "A2"}))
            .to_request();
        let replaced: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(replaced, json!({"name": "A2", "id": 1}));

        let req = test::TestRequest::delete().uri("/users/1").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
        let req = test::TestRequest::delete().uri("/users/1").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::get().uri("/users/1").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let list: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/users").to_request()).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_singleton_over_http() {
        let (_tmp, state) = setup_test_state(json!({ "settings": {"theme": "dark"} })).await;
        let app = test_app!(state);

        let req = test::TestRequest::put()
            .uri("/singletons/settings")
            .set_json(json!({"theme": "light"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let body: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/singletons/settings").to_request(),
        )
        .await;
        assert_eq!(body, json!({"theme": "light"}));

        let req = test::TestRequest::post().uri("/singletons/settings").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_fixed_routes_win_over_clashing_collections() {
        let (_tmp, state) = setup_test_state(json!({ "ping": [], "users": [] })).await;
        let app = test_app!(state);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
        assert_eq!(test::read_body(resp).await, "pong");
        let body: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/routes").to_request())
                .await;
        assert_eq!(body, json!(["users"]));
    }

    #[actix_web::test]
    async fn test_serves_a_migrated_tree() {
        let tmp = TempDir::new().unwrap();
        let source = json!({
            "users": [{"id": 1, "name": "A"}],
            "orders": [],
            "settings": {"theme": "dark"},
        });
        let tree = TreeStore::open(tmp.path().join("data")).await.unwrap();
        let report = migrate(source.as_object().unwrap(), &tree).await;
        assert_eq!(report.total_failed(), 0);

        let store = Store::open(Arc::new(tree), StoreOptions::default())
            .await
            .unwrap();
        let state = web::Data::new(AppState {
            table: RouteTable::build(&store),
        });
        let app = test_app!(state);

        let body: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/routes").to_request())
                .await;
        assert_eq!(body, json!(["orders", "users"]));

        let req = test::TestRequest::post()
            .uri("/users")
            .set_json(json!({"name": "B"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(resp).await;
        let id = created["id"].as_str().unwrap().to_string();

        let fetched: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri(&format!("/users/{id}")).to_request(),
        )
        .await;
        assert_eq!(fetched, json!({"name": "B", "id": id}));

        for _ in 0..2 {
            let req = test::TestRequest::delete().uri("/users/1").to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
        }
        let req = test::TestRequest::get().uri("/users/1").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let settings: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/singletons/settings").to_request(),
        )
        .await;
        assert_eq!(settings, json!({"theme": "dark"}));

        let orders: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/orders").to_request()).await;
        assert_eq!(orders, json!([]));
    }

    #[actix_web::test]
    async fn test_bad_bodies_are_rejected() {
        let (_tmp, state) = setup_test_state(json!({ "users": [] })).await;
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/users")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/users")
            .set_json(json!([1, 2, 3]))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post().uri("/users").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
