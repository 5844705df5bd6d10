use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use once_cell::sync::Lazy;
use reqwest::{redirect::Policy, Client};
use serde_json::{json, Value};
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// In-memory stand-in for the remote backend. Every request is logged as
/// `"METHOD /path"` along with its bearer header.
#[derive(Default)]
struct MockDb {
    user: Value,
    emissions: Vec<Value>,
    sources: Vec<Value>,
    projects: Vec<Value>,
    transactions: Vec<Value>,
    log: Vec<(String, Option<String>)>,
    /// Upcoming `PUT /api/usuario/:id` calls to answer with a 500.
    failing_user_puts: usize,
    /// Upcoming `PUT /api/projeto/:id` calls to answer with a 500.
    failing_project_puts: usize,
}

impl MockDb {
    fn record(&mut self, entry: String, headers: &HeaderMap) {
        let auth = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.log.push((entry, auth));
    }

    fn mutations(&self) -> Vec<&str> {
        self.log
            .iter()
            .map(|(entry, _)| entry.as_str())
            .filter(|entry| !entry.starts_with("GET"))
            .collect()
    }

    fn project(&self, id: &str) -> Option<&Value> {
        self.projects.iter().find(|project| id_of(project) == id)
    }
}

type Db = Arc<Mutex<MockDb>>;

fn id_of(value: &Value) -> String {
    match &value["id"] {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

async fn mock_login(State(db): State<Db>, headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut db = db.lock().await;
    db.record("POST /api/usuario/login".into(), &headers);
    if body["senha"] != "segredo1" {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Credenciais inválidas" })));
    }
    let mut payload = db.user.clone();
    merge(&mut payload, &json!({ "token": "tok-123" }));
    (StatusCode::OK, Json(payload))
}

async fn mock_get_user(State(db): State<Db>, headers: HeaderMap, Path(id): Path<String>) -> Json<Value> {
    let mut db = db.lock().await;
    db.record(format!("GET /api/usuario/{id}"), &headers);
    Json(db.user.clone())
}

type MockReply = Result<StatusCode, (StatusCode, Json<Value>)>;

fn backend_failure(message: &str) -> MockReply {
    Err((StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": message }))))
}

async fn mock_put_user(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> MockReply {
    let mut db = db.lock().await;
    db.record(format!("PUT /api/usuario/{id}"), &headers);
    if db.failing_user_puts > 0 {
        db.failing_user_puts -= 1;
        return backend_failure("Falha ao atualizar usuário");
    }
    merge(&mut db.user, &body);
    Ok(StatusCode::OK)
}

async fn mock_emissions(State(db): State<Db>, headers: HeaderMap) -> Json<Value> {
    let mut db = db.lock().await;
    db.record("GET /api/emissao".into(), &headers);
    Json(Value::Array(db.emissions.clone()))
}

async fn mock_sources(State(db): State<Db>, headers: HeaderMap) -> Json<Value> {
    let mut db = db.lock().await;
    db.record("GET /api/fonteEmissao".into(), &headers);
    Json(Value::Array(db.sources.clone()))
}

async fn mock_projects(State(db): State<Db>, headers: HeaderMap) -> Json<Value> {
    let mut db = db.lock().await;
    db.record("GET /api/projeto".into(), &headers);
    Json(Value::Array(db.projects.clone()))
}

async fn mock_get_project(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let mut db = db.lock().await;
    db.record(format!("GET /api/projeto/{id}"), &headers);
    db.project(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn mock_put_project(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> MockReply {
    let mut db = db.lock().await;
    db.record(format!("PUT /api/projeto/{id}"), &headers);
    if db.failing_project_puts > 0 {
        db.failing_project_puts -= 1;
        return backend_failure("Falha ao atualizar projeto");
    }
    match db.projects.iter_mut().find(|project| id_of(project) == id) {
        Some(project) => {
            merge(project, &body);
            Ok(StatusCode::OK)
        }
        None => Ok(StatusCode::NOT_FOUND),
    }
}

async fn mock_transactions(State(db): State<Db>, headers: HeaderMap) -> Json<Value> {
    let mut db = db.lock().await;
    db.record("GET /api/transacao".into(), &headers);
    Json(Value::Array(db.transactions.clone()))
}

async fn mock_create_transaction(State(db): State<Db>, headers: HeaderMap, Json(body): Json<Value>) -> StatusCode {
    let mut db = db.lock().await;
    db.record("POST /api/transacao".into(), &headers);
    db.transactions.push(body);
    StatusCode::CREATED
}

async fn spawn_backend(db: Db) -> String {
    let app = Router::new()
        .route("/api/usuario/login", post(mock_login))
        .route("/api/usuario/:id", get(mock_get_user).put(mock_put_user))
        .route("/api/emissao", get(mock_emissions))
        .route("/api/fonteEmissao", get(mock_sources))
        .route("/api/projeto", get(mock_projects))
        .route("/api/projeto/:id", get(mock_get_project).put(mock_put_project))
        .route("/api/transacao", get(mock_transactions).post(mock_create_transaction))
        .with_state(db);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

struct TestServer {
    base_url: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[cfg(unix)]
mod cleanup {
    use std::sync::Mutex;
    use std::sync::Once;

    static REGISTER: Once = Once::new();
    static PIDS: Mutex<Vec<i32>> = Mutex::new(Vec::new());

    pub fn register(pid: u32) {
        if let Ok(mut pids) = PIDS.lock() {
            pids.push(pid as i32);
        }
        REGISTER.call_once(|| unsafe {
            libc::atexit(on_exit);
        });
    }

    extern "C" fn on_exit() {
        if let Ok(pids) = PIDS.lock() {
            for pid in pids.iter().copied().filter(|pid| *pid > 0) {
                unsafe {
                    libc::kill(pid, libc::SIGTERM);
                }
            }
        }
    }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn unique_data_path() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("carbon_dashboard_http_{}_{}.json", std::process::id(), nanos));
    path.to_string_lossy().to_string()
}

fn client() -> Client {
    Client::builder().redirect(Policy::none()).build().unwrap()
}

async fn wait_until_ready(base_url: &str) {
    let client = client();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/login")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server(backend_url: &str) -> TestServer {
    let port = pick_free_port();
    let child = Command::new(env!("CARGO_BIN_EXE_carbon_dashboard"))
        .env("PORT", port.to_string())
        .env("APP_DATA_PATH", unique_data_path())
        .env("BACKEND_URL", backend_url)
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer { base_url, child }
}

fn seeded(saldo: i64) -> MockDb {
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    MockDb {
        user: json!({ "id": 1, "nome": "Ana Souza", "email": "ana@bb.com", "saldoCompra": saldo }),
        sources: vec![
            json!({ "id": 1, "tipoFonte": "Energia", "descricao": "Rede Elétrica" }),
            json!({ "id": 2, "tipoFonte": "Frota de Veículos", "descricao": "Diesel" }),
        ],
        emissions: vec![
            json!({ "id": 10, "idUsuarioFK": 1, "idFonteFk": 1, "quantidadeCo2": 100, "dataRegistro": today }),
            json!({ "id": 11, "idUsuarioFK": 1, "idFonteFk": 1, "quantidadeCo2": 200, "dataRegistro": today }),
            json!({ "id": 12, "idUsuarioFK": 1, "idFonteFk": 2, "quantidadeCo2": 50, "dataRegistro": today }),
            json!({ "id": 13, "idUsuarioFK": 1, "idFonteFk": 1, "quantidadeCo2": 2500, "dataRegistro": "2020-01-01" }),
            json!({ "id": 14, "idUsuarioFK": 1, "idFonteFk": 2, "quantidadeCo2": 0.3, "dataRegistro": "2020-01-01" }),
            json!({ "id": 20, "idUsuarioFK": 2, "idFonteFk": 1, "quantidadeCo2": 999, "dataRegistro": today }),
        ],
        projects: vec![json!({
            "id": 5,
            "nome": "Reflorestamento Mata Atlântica",
            "tipo": "reflorestamento",
            "descricao": "Plantio de espécies nativas",
            "reducao": 10000,
            "saldoToken": 10,
            "preco": 4550,
            "status": "verificado",
            "local": "SP"
        })],
        transactions: vec![json!({
            "id": 30,
            "idProjetoFK": 5,
            "idUsuarioFK": 1,
            "quantidadeutilizada": 120,
            "datacompensacao": today,
            "tipotransacao": "compensacao"
        })],
        log: Vec::new(),
        failing_user_puts: 0,
        failing_project_puts: 0,
    }
}

async fn page_text(client: &Client, server: &TestServer, path: &str) -> String {
    client
        .get(format!("{}{path}", server.base_url))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap()
}

async fn login(client: &Client, server: &TestServer) {
    let response = client
        .post(format!("{}/login", server.base_url))
        .form(&[("email", " ana@bb.com "), ("password", "segredo1")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()["location"], "/dashboard");
}

#[tokio::test]
async fn http_dashboard_requires_login_then_aggregates() {
    let _guard = TEST_LOCK.lock().await;
    let db: Db = Arc::new(Mutex::new(seeded(7)));
    let backend_url = spawn_backend(Arc::clone(&db)).await;
    let server = spawn_server(&backend_url).await;
    let client = client();

    let anonymous = client
        .get(format!("{}/api/dashboard", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let page = client
        .get(format!("{}/dashboard", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::SEE_OTHER);
    assert_eq!(page.headers()["location"], "/login");

    login(&client, &server).await;

    let stats: Value = client
        .get(format!("{}/api/dashboard", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["energyEmissions"].as_f64(), Some(2800.0));
    assert!((stats["fleetEmissions"].as_f64().unwrap() - 50.3).abs() < 1e-9);
    assert_eq!(stats["availableTokens"], 7);
    assert_eq!(stats["compensatedEmissions"].as_f64(), Some(120.0));
    assert_eq!(stats["monthlyLabels"].as_array().unwrap().len(), 6);
    assert_eq!(stats["monthlyTrend"][5].as_f64(), Some(350.0));
    assert_eq!(stats["recentActivities"].as_array().unwrap().len(), 4);

    let db = db.lock().await;
    let (_, auth) = db
        .log
        .iter()
        .find(|(entry, _)| entry == "GET /api/usuario/1")
        .expect("user fetched");
    assert_eq!(auth.as_deref(), Some("Bearer tok-123"));
}

#[tokio::test]
async fn http_login_failure_shows_backend_message() {
    let _guard = TEST_LOCK.lock().await;
    let db: Db = Arc::new(Mutex::new(seeded(0)));
    let backend_url = spawn_backend(Arc::clone(&db)).await;
    let server = spawn_server(&backend_url).await;
    let client = client();

    let response = client
        .post(format!("{}/login", server.base_url))
        .form(&[("email", "ana@bb.com"), ("password", "errada")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["location"], "/login");

    let page = client
        .get(format!("{}/login", server.base_url))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("Credenciais inválidas"));
}

#[tokio::test]
async fn http_compensation_with_enough_tokens_moves_balances() {
    let _guard = TEST_LOCK.lock().await;
    let db: Db = Arc::new(Mutex::new(seeded(3)));
    let backend_url = spawn_backend(Arc::clone(&db)).await;
    let server = spawn_server(&backend_url).await;
    let client = client();
    login(&client, &server).await;

    let response = client
        .post(format!("{}/compensation", server.base_url))
        .form(&[("project_id", "5"), ("emission_id", "13"), ("payment_method", "tokens")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["location"], "/compensation");

    let db = db.lock().await;
    assert_eq!(
        db.mutations(),
        vec![
            "POST /api/usuario/login",
            "POST /api/transacao",
            "PUT /api/usuario/1",
            "PUT /api/projeto/5"
        ]
    );
    assert_eq!(db.user["saldoCompra"], 0);
    assert_eq!(db.project("5").unwrap()["saldoToken"], 13);
    let posted = db.transactions.last().unwrap();
    assert_eq!(posted["tipotransacao"], "compensacao");
    assert_eq!(posted["idEmissaoFK"], "13");
    assert_eq!(posted["quantidadeutilizada"].as_f64(), Some(2500.0));
}

#[tokio::test]
async fn http_compensation_with_too_few_tokens_mutates_nothing() {
    let _guard = TEST_LOCK.lock().await;
    let db: Db = Arc::new(Mutex::new(seeded(2)));
    let backend_url = spawn_backend(Arc::clone(&db)).await;
    let server = spawn_server(&backend_url).await;
    let client = client();
    login(&client, &server).await;

    let response = client
        .post(format!("{}/compensation", server.base_url))
        .form(&[("project_id", "5"), ("emission_id", "13"), ("payment_method", "tokens")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["location"], "/compensation");

    {
        let db = db.lock().await;
        assert_eq!(db.mutations(), vec!["POST /api/usuario/login"]);
        assert_eq!(db.user["saldoCompra"], 2);
    }

    let page = client
        .get(format!("{}/compensation", server.base_url))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("Tokens insuficientes. Você tem 2 tokens e precisa de 3."));
}

#[tokio::test]
async fn http_issuance_fills_tokens_from_reduction() {
    let _guard = TEST_LOCK.lock().await;
    let db: Db = Arc::new(Mutex::new(seeded(0)));
    let backend_url = spawn_backend(Arc::clone(&db)).await;
    let server = spawn_server(&backend_url).await;
    let client = client();
    login(&client, &server).await;

    let response = client
        .post(format!("{}/tokenization/issue", server.base_url))
        .form(&[("project_id", "5"), ("reduction", "5000"), ("tokens", "")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["location"], "/tokenization");

    let db = db.lock().await;
    let project = db.project("5").unwrap();
    assert_eq!(project["saldoToken"], 15);
    assert_eq!(project["reducao"].as_f64(), Some(15000.0));

    let sale = db.transactions.last().unwrap();
    assert_eq!(sale["tipotransacao"], "venda");
    assert_eq!(sale["quantidadeutilizada"].as_f64(), Some(5000.0));
    assert_eq!(sale["idEmissaoFK"], "14");
}

#[tokio::test]
async fn http_purchase_moves_tokens_from_project_to_user() {
    let _guard = TEST_LOCK.lock().await;
    let db: Db = Arc::new(Mutex::new(seeded(2)));
    let backend_url = spawn_backend(Arc::clone(&db)).await;
    let server = spawn_server(&backend_url).await;
    let client = client();
    login(&client, &server).await;

    let response = client
        .post(format!("{}/tokenization/buy", server.base_url))
        .form(&[("project_id", "5"), ("amount", "4"), ("available", "10"), ("payment_method", "pix")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["location"], "/tokenization");

    {
        let db = db.lock().await;
        assert_eq!(
            db.mutations(),
            vec![
                "POST /api/usuario/login",
                "PUT /api/projeto/5",
                "PUT /api/usuario/1",
                "POST /api/transacao"
            ]
        );
        assert_eq!(db.project("5").unwrap()["saldoToken"], 6);
        assert_eq!(db.user["saldoCompra"], 6);

        let purchase = db.transactions.last().unwrap();
        assert_eq!(purchase["tipotransacao"], "compra");
        assert_eq!(purchase["quantidadeutilizada"].as_f64(), Some(4000.0));
        assert_eq!(purchase["idProjetoFK"], "5");
        assert_eq!(purchase["idUsuarioFK"], "1");
        assert_eq!(purchase["idEmissaoFK"], "14");
    }

    let page = page_text(&client, &server, "/tokenization").await;
    assert!(page.contains("Compra de 4 tokens de"));
}

#[tokio::test]
async fn http_compensation_reports_failed_project_credit() {
    let _guard = TEST_LOCK.lock().await;
    let mut seed = seeded(3);
    seed.failing_project_puts = 1;
    let db: Db = Arc::new(Mutex::new(seed));
    let backend_url = spawn_backend(Arc::clone(&db)).await;
    let server = spawn_server(&backend_url).await;
    let client = client();
    login(&client, &server).await;

    let response = client
        .post(format!("{}/compensation", server.base_url))
        .form(&[("project_id", "5"), ("emission_id", "13"), ("payment_method", "tokens")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["location"], "/compensation");

    {
        let db = db.lock().await;
        assert_eq!(
            db.mutations(),
            vec![
                "POST /api/usuario/login",
                "POST /api/transacao",
                "PUT /api/usuario/1",
                "PUT /api/projeto/5"
            ]
        );
        assert_eq!(db.transactions.len(), 2);
        assert_eq!(db.transactions.last().unwrap()["tipotransacao"], "compensacao");
        assert_eq!(db.user["saldoCompra"], 0);
        assert_eq!(db.project("5").unwrap()["saldoToken"], 10);
    }

    let page = page_text(&client, &server, "/compensation").await;
    assert!(page.contains("Operação incompleta (creditar tokens do projeto): Falha ao atualizar projeto"));
}

#[tokio::test]
async fn http_purchase_reports_failed_user_credit() {
    let _guard = TEST_LOCK.lock().await;
    let mut seed = seeded(2);
    seed.failing_user_puts = 1;
    let db: Db = Arc::new(Mutex::new(seed));
    let backend_url = spawn_backend(Arc::clone(&db)).await;
    let server = spawn_server(&backend_url).await;
    let client = client();
    login(&client, &server).await;

    client
        .post(format!("{}/tokenization/buy", server.base_url))
        .form(&[("project_id", "5"), ("amount", "4"), ("available", "10"), ("payment_method", "pix")])
        .send()
        .await
        .unwrap();

    {
        let db = db.lock().await;
        assert_eq!(
            db.mutations(),
            vec!["POST /api/usuario/login", "PUT /api/projeto/5", "PUT /api/usuario/1"]
        );
        assert_eq!(db.project("5").unwrap()["saldoToken"], 6);
        assert_eq!(db.user["saldoCompra"], 2);
        assert_eq!(db.transactions.len(), 1);
    }

    let page = page_text(&client, &server, "/tokenization").await;
    assert!(page.contains("Operação incompleta (atualizar saldo do usuário): Falha ao atualizar usuário"));
}

#[tokio::test]
async fn http_logout_clears_session() {
    let _guard = TEST_LOCK.lock().await;
    let db: Db = Arc::new(Mutex::new(seeded(1)));
    let backend_url = spawn_backend(Arc::clone(&db)).await;
    let server = spawn_server(&backend_url).await;
    let client = client();
    login(&client, &server).await;

    let response = client
        .post(format!("{}/logout", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["location"], "/login");

    let api = client
        .get(format!("{}/api/dashboard", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(api.status(), StatusCode::UNAUTHORIZED);
}
