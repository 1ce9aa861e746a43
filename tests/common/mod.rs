#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_natours-api"));
        cmd.env("HOST", "127.0.0.1")
            .env("NATOURS_API_PORT", port.to_string())
            .env("API_ENABLE_RATE_LIMITING", "false")
            .env("SECURITY_BCRYPT_COST", "4")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // DATABASE_URL is inherited from the environment (or the server's .env)
        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn database_url() -> Option<String> {
    let _ = dotenvy::dotenv();
    std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty())
}

/// The shared test server, or `None` when no database is configured
pub async fn server() -> Result<Option<&'static TestServer>> {
    if database_url().is_none() {
        eprintln!("DATABASE_URL not set; skipping");
        return Ok(None);
    }
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(20)).await?;
    Ok(Some(server))
}

/// A signed-up user and their session token
pub struct Session {
    pub id: String,
    pub email: String,
    pub password: String,
    pub token: String,
}

pub fn unique_email(prefix: &str) -> String {
    format!("{}-{}@example.com", prefix, uuid::Uuid::new_v4().simple())
}

pub async fn signup(client: &reqwest::Client, server: &TestServer, name: &str) -> Result<Session> {
    let email = unique_email(&name.to_lowercase().replace(' ', "-"));
    let password = "test-pass-1234".to_string();
    let res = client
        .post(server.url("/api/v1/users/signup"))
        .json(&json!({
            "name": name,
            "email": email,
            "password": password,
            "passwordConfirm": password,
        }))
        .send()
        .await?;
    anyhow::ensure!(res.status() == StatusCode::CREATED, "signup failed: {}", res.status());

    let body: Value = res.json().await?;
    Ok(Session {
        id: body["data"]["user"]["id"].as_str().context("user id")?.to_string(),
        email,
        password,
        token: body["token"].as_str().context("token")?.to_string(),
    })
}

/// Change a user's role directly in the database
pub async fn promote(session: &Session, role: &str) -> Result<()> {
    let url = database_url().context("DATABASE_URL")?;
    let pool = sqlx::PgPool::connect(&url).await?;
    sqlx::query("UPDATE users SET role = $1 WHERE id = $2::uuid")
        .bind(role)
        .bind(&session.id)
        .execute(&pool)
        .await?;
    pool.close().await;
    Ok(())
}

/// A valid tour body with a unique name
pub fn tour_body(price: f64) -> Value {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    json!({
        "name": format!("Test Tour {}", &suffix[..12]),
        "duration": 5,
        "maxGroupSize": 10,
        "difficulty": "medium",
        "price": price,
        "summary": "A tour created by the integration tests",
        "imageCover": "tour-test-cover.jpg",
        "startLocation": { "type": "Point", "coordinates": [-115.570154, 51.178456], "description": "Banff" },
    })
}

pub async fn create_tour(client: &reqwest::Client, server: &TestServer, admin: &Session, body: &Value) -> Result<Value> {
    let res = client
        .post(server.url("/api/v1/tours"))
        .bearer_auth(&admin.token)
        .json(body)
        .send()
        .await?;
    anyhow::ensure!(res.status() == StatusCode::CREATED, "tour creation failed: {}", res.status());
    let body: Value = res.json().await?;
    Ok(body["data"]["data"].clone())
}
