pub mod config {
    use serde::Deserialize;

    #[derive(Deserialize, Debug, Clone)]
    pub struct Config {
        pub db_url: String,
        #[serde(default = "default_port")]
        pub port: u16,
        pub jwt_secret: String,
        /// Lifetime of a login session.
        #[serde(default = "default_session_hours")]
        pub session_hours: i64,
        /// Marks session cookies `Secure`; enable behind HTTPS.
        #[serde(default)]
        pub secure_cookies: bool,
    }

    impl Config {
        /// Loads configuration from environment variables.
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_environment(config::Environment::default())
        }

        fn from_environment(environment: config::Environment) -> anyhow::Result<Self> {
            let settings = config::Config::builder().add_source(environment).build()?;

            let config: Config = settings.try_deserialize()?;
            Ok(config)
        }
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_session_hours() -> i64 {
        24
    }

}
pub mod auth;
pub mod entities;
pub mod task;
pub mod user;
pub mod web;
