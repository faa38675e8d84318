use std::time::Duration;

use url::Url;

use crate::attendance::AttendanceMode;
use crate::error::Error;
use crate::media::CameraConstraints;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Client configuration.
///
/// The API base URL is the only required field and is a constructor parameter.
///
/// ```rust,ignore
/// use attendance_client::ClientConfig;
///
/// let config = ClientConfig::new("https://attendance.example.com".parse()?)
///     .with_cooldown(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) base_url: Url,
    pub(crate) frame_interval: Duration,
    pub(crate) cooldown: Duration,
    pub(crate) jpeg_quality: u8,
    pub(crate) attendance_mode: AttendanceMode,
    pub(crate) countdown: Duration,
    pub(crate) countdown_tick: Duration,
    pub(crate) dashboard_days: u32,
    pub(crate) recent_limit: u32,
    pub(crate) camera: CameraConstraints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL.parse().expect("valid default URL"))
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            frame_interval: AttendanceMode::Roster.default_frame_interval(),
            cooldown: Duration::from_millis(2500),
            jpeg_quality: 85,
            attendance_mode: AttendanceMode::Roster,
            countdown: Duration::from_secs(3),
            countdown_tick: Duration::from_millis(250),
            dashboard_days: 7,
            recent_limit: 10,
            camera: CameraConstraints::default(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `ATTENDANCE_API_BASE_URL`: API origin (default `http://localhost:8000`)
    /// - `ATTENDANCE_MODE`: `roster` (mark by name) or `self` (mark own attendance)
    /// - `ATTENDANCE_FRAME_INTERVAL_MS`: sampling cadence (default depends on mode)
    /// - `ATTENDANCE_COOLDOWN_MS`: minimum gap between attendance marks
    /// - `ATTENDANCE_JPEG_QUALITY`: 1-100
    /// - `ATTENDANCE_CAMERA_DEVICE`: device id to open (default: platform choice)
    /// - `ATTENDANCE_CAMERA_FPS`: ideal camera frame rate (default 24)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, Error> {
        let base_url = match std::env::var("ATTENDANCE_API_BASE_URL") {
            Ok(s) => s
                .parse()
                .map_err(|e| Error::Config(format!("ATTENDANCE_API_BASE_URL: {e}")))?,
            Err(_) => DEFAULT_BASE_URL.parse().expect("valid default URL"),
        };

        let mut config = Self::new(base_url);

        if let Ok(mode) = std::env::var("ATTENDANCE_MODE") {
            config = config.with_attendance_mode(mode.parse()?);
        }
        if let Some(ms) = env_number::<u64>("ATTENDANCE_FRAME_INTERVAL_MS")? {
            config = config.with_frame_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = env_number::<u64>("ATTENDANCE_COOLDOWN_MS")? {
            config = config.with_cooldown(Duration::from_millis(ms));
        }
        if let Some(q) = env_number::<u8>("ATTENDANCE_JPEG_QUALITY")? {
            if !(1..=100).contains(&q) {
                return Err(Error::Config(format!(
                    "ATTENDANCE_JPEG_QUALITY: expected 1-100, got {q}"
                )));
            }
            config = config.with_jpeg_quality(q);
        }
        if let Ok(device) = std::env::var("ATTENDANCE_CAMERA_DEVICE") {
            let device = device.trim();
            if !device.is_empty() {
                config.camera.device_id = Some(device.to_string());
            }
        }
        if let Some(fps) = env_number::<u32>("ATTENDANCE_CAMERA_FPS")? {
            if fps == 0 {
                return Err(Error::Config(
                    "ATTENDANCE_CAMERA_FPS: expected a positive frame rate".into(),
                ));
            }
            config.camera.ideal_fps = fps;
        }

        Ok(config)
    }

    /// Override the sampling cadence.
    #[must_use]
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Override the attendance cooldown window (default 2.5 s).
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Override the JPEG quality used for sampled frames (default 85).
    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Switch attendance mode. Also resets the cadence to that mode's default.
    #[must_use]
    pub fn with_attendance_mode(mut self, mode: AttendanceMode) -> Self {
        self.attendance_mode = mode;
        self.frame_interval = mode.default_frame_interval();
        self
    }

    /// Override the face sign-in countdown (default 3 s, redrawn every 250 ms).
    #[must_use]
    pub fn with_countdown(mut self, total: Duration, tick: Duration) -> Self {
        self.countdown = total;
        self.countdown_tick = tick;
        self
    }

    /// Override the dashboard window and recent-activity length.
    #[must_use]
    pub fn with_dashboard_window(mut self, days: u32, recent_limit: u32) -> Self {
        self.dashboard_days = days;
        self.recent_limit = recent_limit;
        self
    }

    /// Override which camera is opened and at what frame rate.
    #[must_use]
    pub fn with_camera(mut self, constraints: CameraConstraints) -> Self {
        self.camera = constraints;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    #[must_use]
    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    #[must_use]
    pub fn attendance_mode(&self) -> AttendanceMode {
        self.attendance_mode
    }

    #[must_use]
    pub fn countdown(&self) -> Duration {
        self.countdown
    }

    #[must_use]
    pub fn countdown_tick(&self) -> Duration {
        self.countdown_tick
    }

    #[must_use]
    pub fn dashboard_days(&self) -> u32 {
        self.dashboard_days
    }

    #[must_use]
    pub fn recent_limit(&self) -> u32 {
        self.recent_limit
    }

    #[must_use]
    pub fn camera(&self) -> &CameraConstraints {
        &self.camera
    }

    /// `{base}{path}`, keeping any path prefix the base URL carries.
    pub(crate) fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!("{}{path}", self.base_url.path().trim_end_matches('/'));
        url.set_path(&joined);
        url.set_query(None);
        url
    }
}

fn env_number<T>(key: &str) -> Result<Option<T>, Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{key}: {e}"))),
        Err(_) => Ok(None),
    }
}
