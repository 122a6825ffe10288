// Supervisor constants (no magic values)
use std::time::Duration;

/// Time a terminated probe server gets to exit before it is killed (5 seconds)
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Environment variable naming the board support root directory
pub const ROOT_DIR_ENV: &str = "BSP_ROOT";
