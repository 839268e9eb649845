//! Server configuration

pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Country", "City", "River", "Animal", "Plant", "Name", "Thing",
];

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Room seeded at startup for development; rooms are otherwise
    /// created by the out-of-scope CRUD layer.
    pub seed_room_id: Option<String>,
    /// Round target for the seeded room
    pub round_target: u32,
    /// Category prompts handed out each round
    pub categories: Vec<String>,
}

impl ServerConfig {
    /// Load config from environment variables:
    /// PORT, SEED_ROOM_ID, ROUND_TARGET, CATEGORIES (comma-separated)
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let seed_room_id = std::env::var("SEED_ROOM_ID")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let round_target = match std::env::var("ROUND_TARGET").ok().map(|s| s.parse()) {
            Some(Ok(n)) if n > 0 => n,
            Some(_) => {
                tracing::warn!("ROUND_TARGET must be a positive integer, using default 5");
                5
            }
            None => 5,
        };

        let categories = std::env::var("CATEGORIES")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect());

        Self {
            port,
            seed_room_id,
            round_target,
            categories,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            seed_room_id: None,
            round_target: 5,
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        }
    }
}
