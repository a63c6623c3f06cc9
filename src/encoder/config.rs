use std::{env, time::Duration};

/// Scene names the display's stage mapping switches between.
#[derive(Debug, Clone)]
pub struct SceneNames {
    /// Scene shown while the kiosk sits in standby.
    pub attract: String,
    /// Scene shown during countdown and the live rip window.
    pub live: String,
    /// Scene shown while the pulled card is revealed.
    pub reveal: String,
}

impl Default for SceneNames {
    fn default() -> Self {
        Self {
            attract: "Attract Loop".into(),
            live: "Live Rip".into(),
            reveal: "Card Reveal".into(),
        }
    }
}

/// Ingest destination pushed to the encoder before streaming starts.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Ingest server URL.
    pub server: String,
    /// Stream key.
    pub key: String,
    /// Service type identifier understood by the encoder.
    pub service_type: String,
}

/// Connection settings for the on-premises streaming encoder.
///
/// A missing URL means the deployment has no encoder; the manager is then
/// permanently disabled and every control call reports that instead of
/// touching the network.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Control socket URL (`ws://...`); `None` disables the manager.
    pub url: Option<String>,
    /// Optional control socket password.
    pub password: Option<String>,
    /// Scene applied right after a successful connect, if any.
    pub default_scene: Option<String>,
    /// Scene names used by the stage mapping.
    pub scenes: SceneNames,
    /// Ingest settings applied before the first stream start, if configured.
    pub stream: Option<StreamSettings>,
    /// Bounded number of connect attempts for recoverable failures.
    pub connect_attempts: u32,
    /// Fixed delay between connect attempts.
    pub connect_retry_delay: Duration,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            url: None,
            password: None,
            default_scene: None,
            scenes: SceneNames::default(),
            stream: None,
            connect_attempts: 3,
            connect_retry_delay: Duration::from_secs(2),
        }
    }
}

impl EncoderConfig {
    /// Build a configuration by reading the expected environment variables.
    pub fn from_env() -> Self {
        let scenes = SceneNames::default();
        let scenes = SceneNames {
            attract: env::var("ENCODER_SCENE_ATTRACT").unwrap_or(scenes.attract),
            live: env::var("ENCODER_SCENE_LIVE").unwrap_or(scenes.live),
            reveal: env::var("ENCODER_SCENE_REVEAL").unwrap_or(scenes.reveal),
        };

        let stream = match (env::var("ENCODER_STREAM_SERVER"), env::var("ENCODER_STREAM_KEY")) {
            (Ok(server), Ok(key)) => Some(StreamSettings {
                server,
                key,
                service_type: env::var("ENCODER_STREAM_SERVICE")
                    .unwrap_or_else(|_| "rtmp_custom".into()),
            }),
            _ => None,
        };

        Self {
            url: env::var("ENCODER_URL").ok().filter(|url| !url.is_empty()),
            password: env::var("ENCODER_PASSWORD").ok(),
            default_scene: env::var("ENCODER_DEFAULT_SCENE").ok(),
            scenes,
            stream,
            ..Self::default()
        }
    }
}
