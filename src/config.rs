use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub catalog_user: String,
    pub catalog_password: String,
    pub listen_address: String,
    pub listen_port: u16,
    /// Output backend: "device" (default) or "raw".
    pub audio_output: String,
    /// Destination for the "raw" backend (file or FIFO).
    pub raw_output_path: String,
    /// Where to persist queue + transport state between runs. Unset disables
    /// the savestate subscriber.
    pub state_file: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        // Credentials are required - the catalog refuses anonymous sessions
        let catalog_user = env::var("CATALOG_USER")
            .map_err(|_| anyhow::anyhow!("CATALOG_USER environment variable must be set"))?;
        let catalog_password = env::var("CATALOG_PASSWORD")
            .map_err(|_| anyhow::anyhow!("CATALOG_PASSWORD environment variable must be set"))?;

        let audio_output = env::var("AUDIO_OUTPUT").unwrap_or_else(|_| "device".to_string());
        match audio_output.as_str() {
            "device" | "raw" => {}
            other => {
                return Err(anyhow::anyhow!(
                    "AUDIO_OUTPUT must be \"device\" or \"raw\", got \"{}\"",
                    other
                ))
            }
        }

        Ok(Config {
            catalog_user,
            catalog_password,
            listen_address: env::var("LISTEN_ADDRESS").unwrap_or_else(|_| "127.0.0.1".to_string()),
            listen_port: env::var("LISTEN_PORT")
                .unwrap_or_else(|_| "6602".to_string())
                .parse()
                .unwrap_or(6602),
            audio_output,
            raw_output_path: env::var("RAW_OUTPUT_PATH")
                .unwrap_or_else(|_| "jukeboxd.pcm".to_string()),
            state_file: env::var("STATE_FILE").ok(),
        })
    }
}
