use sqlx::postgres::{PgConnectOptions, PgSslMode};

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Where and how to connect to postgres.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    pub host: String,
    pub port: u16,
    pub db_name: String,
    pub username: String,
    pub password: String,
    /// Use TLS. When false, TLS is disabled entirely.
    pub ssl: bool,
    /// Size of the connection pool.
    pub max_connections: u32,
}

impl PostgresOptions {
    pub fn new(host: impl Into<String>, port: u16, db_name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            db_name: db_name.into(),
            username: "postgres".to_string(),
            password: String::new(),
            ssl: false,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Change the credentials used to connect.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Change whether TLS is used.
    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// Change the size of the connection pool.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// The server address, without credentials. Safe to log.
    pub fn address(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.db_name)
    }

    pub fn ssl_mode(&self) -> PgSslMode {
        if self.ssl {
            PgSslMode::Prefer
        } else {
            PgSslMode::Disable
        }
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.db_name)
            .username(&self.username)
            .ssl_mode(self.ssl_mode());

        if self.password.is_empty() {
            options
        } else {
            options.password(&self.password)
        }
    }
}
