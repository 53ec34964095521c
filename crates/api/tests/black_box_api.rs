use std::str::FromStr;

use chrono::Utc;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use uuid::Uuid;

use clinicore_api::config::ApiConfig;

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let app = clinicore_api::app::build_app(&ApiConfig::default())
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn as_role(&self, roles: &str) -> Caller<'_> {
        Caller {
            srv: self,
            actor: Uuid::now_v7().to_string(),
            roles: roles.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Sends requests with the identity headers an upstream gateway would set.
struct Caller<'a> {
    srv: &'a TestServer,
    actor: String,
    roles: String,
}

impl Caller<'_> {
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.srv
            .client
            .request(method, self.srv.url(path))
            .header("x-actor-id", &self.actor)
            .header("x-actor-roles", &self.roles)
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = self.request(method, path);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let res = req.send().await.unwrap();
        let status = res.status();
        let text = res.text().await.unwrap();
        let value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        (status, value)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(reqwest::Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, Some(body)).await
    }

    async fn patch(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::PATCH, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        self.send(reqwest::Method::DELETE, path, None).await
    }

    async fn register_material(&self, code: &str, price: &str, opening: &str, min: &str) -> String {
        let (status, body) = self
            .post(
                "/materials",
                json!({
                    "code": code,
                    "name": format!("Material {code}"),
                    "unit": "un",
                    "minStock": min,
                    "unitPrice": price,
                    "openingStock": opening,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn appointment_in_progress(&self) -> String {
        let (status, body) = self
            .post(
                "/appointments",
                json!({
                    "patientId": Uuid::now_v7(),
                    "dentistId": Uuid::now_v7(),
                    "scheduledAt": Utc::now(),
                    "procedure": "Restoration",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "schedule failed: {body}");
        let id = body["id"].as_str().unwrap().to_string();

        for target in ["CONFIRMED", "IN_PROGRESS"] {
            let (status, body) = self
                .patch(&format!("/appointments/{id}/status"), json!({ "status": target }))
                .await;
            assert_eq!(status, StatusCode::OK, "transition to {target} failed: {body}");
        }
        id
    }
}

fn dec(v: &Value) -> Decimal {
    match v {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).unwrap(),
        other => panic!("expected a decimal, got {other}"),
    }
}

#[tokio::test]
async fn health_does_not_require_identity() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_or_malformed_identity_is_unauthorized() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .get(srv.url(&format!("/appointments/{}", Uuid::now_v7())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");

    let res = srv
        .client
        .get(srv.url("/materials/low-stock"))
        .header("x-actor-id", "not-a-uuid")
        .header("x-actor-roles", "admin")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn usage_lifecycle_keeps_stock_and_costs_in_step() {
    let srv = TestServer::spawn().await;
    let staff = srv.as_role("receptionist");

    let material = staff.register_material("RESIN-A2", "2.50", "10", "2").await;
    let appt = staff.appointment_in_progress().await;

    // Add: stock 10 -> 7, value 3 x 2.50.
    let (status, usage) = staff
        .post(
            &format!("/appointments/{appt}/materials"),
            json!({ "materialId": material, "quantity": "3", "note": "two surfaces" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{usage}");
    assert_eq!(dec(&usage["totalValue"]), Decimal::new(750, 2));
    let usage_id = usage["id"].as_str().unwrap().to_string();

    let (_, m) = staff.get(&format!("/materials/{material}")).await;
    assert_eq!(dec(&m["stock"]), Decimal::from(7));

    // Update to 5 moves only the delta.
    let (status, revised) = staff
        .patch(&format!("/material-usages/{usage_id}"), json!({ "quantity": "5" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{revised}");
    assert_eq!(dec(&revised["totalValue"]), Decimal::new(1250, 2));
    let (_, m) = staff.get(&format!("/materials/{material}")).await;
    assert_eq!(dec(&m["stock"]), Decimal::from(5));

    let (status, total) = staff.get(&format!("/appointments/{appt}/materials/total")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec(&total["totalMaterialCost"]), Decimal::new(1250, 2));

    // Remove restores the stock and clears the cost.
    let (status, _) = staff.delete(&format!("/material-usages/{usage_id}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, m) = staff.get(&format!("/materials/{material}")).await;
    assert_eq!(dec(&m["stock"]), Decimal::from(10));
    let (_, total) = staff.get(&format!("/appointments/{appt}/materials/total")).await;
    assert_eq!(dec(&total["totalMaterialCost"]), Decimal::ZERO);

    let (status, _) = staff.delete(&format!("/material-usages/{usage_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The ledger shows opening IN, OUT 3, OUT 2, IN 5.
    let (status, page) = staff.get(&format!("/materials/{material}/movements")).await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|mv| mv["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, ["IN", "OUT", "OUT", "IN"]);
}

#[tokio::test]
async fn closed_appointments_reject_usage_changes() {
    let srv = TestServer::spawn().await;
    let staff = srv.as_role("receptionist");

    let material = staff.register_material("GAUZE", "0.10", "50", "5").await;
    let appt = staff.appointment_in_progress().await;

    let (status, _) = staff
        .patch(&format!("/appointments/{appt}/status"), json!({ "status": "COMPLETED" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = staff
        .post(
            &format!("/appointments/{appt}/materials"),
            json!({ "materialId": material, "quantity": "1" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "appointment_terminal");

    let (_, m) = staff.get(&format!("/materials/{material}")).await;
    assert_eq!(dec(&m["stock"]), Decimal::from(50));
}

#[tokio::test]
async fn status_changes_follow_the_transition_table() {
    let srv = TestServer::spawn().await;
    let staff = srv.as_role("receptionist");
    let appt = staff.appointment_in_progress().await;

    let (status, body) = staff
        .patch(&format!("/appointments/{appt}/status"), json!({ "status": "SCHEDULED" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");

    let (status, body) = staff
        .patch(&format!("/appointments/{appt}/status"), json!({ "status": "NO_SHOW" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_argument");

    let (status, body) = staff.get(&format!("/appointments/{appt}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "IN_PROGRESS");
}

#[tokio::test]
async fn insufficient_stock_is_a_conflict_and_changes_nothing() {
    let srv = TestServer::spawn().await;
    let staff = srv.as_role("receptionist");

    let material = staff.register_material("ANESTH", "4.00", "2", "1").await;
    let appt = staff.appointment_in_progress().await;

    let (status, body) = staff
        .post(
            &format!("/appointments/{appt}/materials"),
            json!({ "materialId": material, "quantity": "3" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_stock");

    let (status, body) = staff
        .post(
            &format!("/materials/{material}/movements"),
            json!({ "kind": "ADJUST", "direction": "DECREASE", "quantity": "5" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_stock");

    let (_, usages) = staff.get(&format!("/appointments/{appt}/materials")).await;
    assert!(usages["items"].as_array().unwrap().is_empty());
    let (_, m) = staff.get(&format!("/materials/{material}")).await;
    assert_eq!(dec(&m["stock"]), Decimal::from(2));
}

#[tokio::test]
async fn dentists_may_move_appointments_along_but_not_touch_stock() {
    let srv = TestServer::spawn().await;
    let staff = srv.as_role("receptionist");
    let dentist = srv.as_role("dentist");

    let material = staff.register_material("FLOSS", "1.00", "5", "0").await;
    let (_, appt) = staff
        .post(
            "/appointments",
            json!({
                "patientId": Uuid::now_v7(),
                "dentistId": Uuid::now_v7(),
                "scheduledAt": Utc::now(),
                "procedure": "Cleaning",
            }),
        )
        .await;
    let appt = appt["id"].as_str().unwrap().to_string();

    let (status, _) = dentist
        .patch(&format!("/appointments/{appt}/status"), json!({ "status": "CONFIRMED" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = dentist
        .patch(&format!("/appointments/{appt}/status"), json!({ "status": "CANCELLED" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "permission_denied");

    let (status, _) = dentist
        .post(
            &format!("/materials/{material}/movements"),
            json!({ "kind": "OUT", "quantity": "1" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let nobody = srv.as_role("");
    let (status, _) = nobody.get("/materials/low-stock").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_and_unknown_references() {
    let srv = TestServer::spawn().await;
    let admin = srv.as_role("admin");

    let (status, body) = admin.get("/appointments/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    let (status, _) = admin.get(&format!("/appointments/{}", Uuid::now_v7())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = admin
        .get(&format!("/appointments/{}/materials/total", Uuid::now_v7()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = admin
        .post(
            &format!("/materials/{}/movements", Uuid::now_v7()),
            json!({ "kind": "SIDEWAYS", "quantity": "1" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");

    let (status, body) = admin
        .post(
            &format!("/materials/{}/movements", Uuid::now_v7()),
            json!({ "kind": "IN", "quantity": "1" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");

    let (status, body) = admin.post("/materials", json!({ "code": 42 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_body");
}

#[tokio::test]
async fn inactive_materials_cannot_be_consumed() {
    let srv = TestServer::spawn().await;
    let admin = srv.as_role("admin");

    let material = admin.register_material("OLD-CEMENT", "3.00", "10", "0").await;
    let appt = admin.appointment_in_progress().await;

    let (status, _) = admin.post(&format!("/materials/{material}/deactivate"), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = admin
        .post(
            &format!("/appointments/{appt}/materials"),
            json!({ "materialId": material, "quantity": "1" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "material_inactive");
}

#[tokio::test]
async fn low_stock_report_catches_up_with_movements() {
    let srv = TestServer::spawn().await;
    let staff = srv.as_role("receptionist");

    let material = staff.register_material("NEEDLE-30G", "0.80", "6", "5").await;
    let (status, _) = staff
        .post(
            &format!("/materials/{material}/movements"),
            json!({ "kind": "OUT", "quantity": "2", "note": "damaged box" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // The report is fed by a background projection; poll briefly.
    for _ in 0..100 {
        let (status, body) = staff.get("/materials/low-stock").await;
        assert_eq!(status, StatusCode::OK);
        let hit = body["items"]
            .as_array()
            .unwrap()
            .iter()
            .find(|v| v["id"] == material.as_str());
        if let Some(view) = hit {
            assert_eq!(view["code"], "NEEDLE-30G");
            assert_eq!(dec(&view["stock"]), Decimal::from(4));
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    panic!("material did not appear in the low-stock report within timeout");
}

#[tokio::test]
async fn consumption_report_uses_prices_at_time_of_use() {
    let srv = TestServer::spawn().await;
    let staff = srv.as_role("receptionist");

    let material = staff.register_material("COMPOSITE", "10.00", "20", "0").await;
    let appt = staff.appointment_in_progress().await;

    let (status, _) = staff
        .post(
            &format!("/appointments/{appt}/materials"),
            json!({ "materialId": material, "quantity": "2" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = staff
        .patch(&format!("/materials/{material}/price"), json!({ "unitPrice": "15.00" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, report) = staff
        .get(&format!("/reports/consumption?materialId={material}"))
        .await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(dec(&report["totalValue"]), Decimal::from(20));
    assert_eq!(dec(&report["totalQuantity"]), Decimal::from(2));
    assert_eq!(report["usageCount"], 1);
}

#[tokio::test]
async fn appointment_movements_and_usage_report_list_what_happened() {
    let srv = TestServer::spawn().await;
    let staff = srv.as_role("receptionist");

    let gauze = staff.register_material("GAUZE", "0.50", "30", "0").await;
    let appt = staff.appointment_in_progress().await;

    let (status, usage) = staff
        .post(
            &format!("/appointments/{appt}/materials"),
            json!({ "materialId": gauze, "quantity": "3" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{usage}");
    let usage_id = usage["id"].as_str().unwrap().to_string();

    let (status, _) = staff
        .patch(&format!("/material-usages/{usage_id}"), json!({ "quantity": "5" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = staff.get(&format!("/appointments/{appt}/movements")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|m| m["appointmentId"] == appt.as_str()));
    assert!(items.iter().all(|m| m["usageId"] == usage_id.as_str()));

    let (status, body) = staff
        .get(&format!("/reports/usages?materialId={gauze}"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(dec(&items[0]["quantity"]), Decimal::from(5));

    let (status, _) = staff
        .get(&format!("/appointments/{}/movements", Uuid::now_v7()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unrepresentable_totals_are_unprocessable() {
    let srv = TestServer::spawn().await;
    let staff = srv.as_role("receptionist");

    let material = staff
        .register_material("IMPLANT-X", &Decimal::MAX.to_string(), "10", "0")
        .await;
    let appt = staff.appointment_in_progress().await;

    let (status, body) = staff
        .post(
            &format!("/appointments/{appt}/materials"),
            json!({ "materialId": material, "quantity": "2" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    assert_eq!(body["error"], "invalid_argument");

    let (status, body) = staff.get(&format!("/materials/{material}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec(&body["stock"]), Decimal::from(10));
}
