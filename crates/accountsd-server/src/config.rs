use accountsd_proto::DEFAULT_MAX_FRAME_BYTES;
use std::env;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolPaths {
    pub groupmod: String,
    pub groupmems: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            groupmod: "/usr/sbin/groupmod".to_string(),
            groupmems: "/usr/sbin/groupmems".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub socket_path: String,
    pub pid_path: String,
    pub group_file: String,
    pub passwd_file: String,
    pub rescan_interval_ms: u64,
    pub notify_capacity: usize,
    pub max_frame_bytes: usize,
    pub admin_uids: Vec<u32>,
    pub tools: ToolPaths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: "/run/accountsd.sock".to_string(),
            pid_path: "/run/accountsd.pid".to_string(),
            group_file: "/etc/group".to_string(),
            passwd_file: "/etc/passwd".to_string(),
            rescan_interval_ms: 2_000,
            notify_capacity: 64,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            admin_uids: Vec::new(),
            tools: ToolPaths::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| env::var(k).ok())
    }

    /// Same as `from_env` over an arbitrary source; unparsable values keep the default.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Self {
        let mut c = Self::default();
        if let Some(v) = get("ACCOUNTSD_SOCKET") {
            c.socket_path = v;
            // pid file follows the socket unless set explicitly below
            let path = std::path::Path::new(&c.socket_path);
            if let Some(parent) = path.parent() {
                let stem = path.file_stem().unwrap_or_default();
                let mut pid_name = stem.to_os_string();
                pid_name.push(".pid");
                c.pid_path = parent.join(pid_name).to_string_lossy().to_string();
            }
        }
        if let Some(v) = get("ACCOUNTSD_PID_FILE") {
            c.pid_path = v;
        }
        if let Some(v) = get("ACCOUNTSD_GROUP_FILE") {
            c.group_file = v;
        }
        if let Some(v) = get("ACCOUNTSD_PASSWD_FILE") {
            c.passwd_file = v;
        }
        if let Some(v) = get("ACCOUNTSD_RESCAN_MS") {
            c.rescan_interval_ms = v.parse().unwrap_or(c.rescan_interval_ms);
            if c.rescan_interval_ms < 100 {
                tracing::warn!(
                    "ACCOUNTSD_RESCAN_MS={} is too low, using 100",
                    c.rescan_interval_ms
                );
                c.rescan_interval_ms = 100;
            }
        }
        if let Some(v) = get("ACCOUNTSD_NOTIFY_CAP") {
            c.notify_capacity = v.parse().unwrap_or(c.notify_capacity);
        }
        if let Some(v) = get("ACCOUNTSD_MAX_FRAME") {
            c.max_frame_bytes = v.parse().unwrap_or(c.max_frame_bytes);
        }
        if let Some(v) = get("ACCOUNTSD_ADMIN_UIDS") {
            c.admin_uids = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(|s| match s.parse() {
                    Ok(uid) => Some(uid),
                    Err(_) => {
                        tracing::warn!("ignoring bad uid '{}' in ACCOUNTSD_ADMIN_UIDS", s);
                        None
                    }
                })
                .collect();
        }
        if let Some(v) = get("ACCOUNTSD_GROUPMOD") {
            c.tools.groupmod = v;
        }
        if let Some(v) = get("ACCOUNTSD_GROUPMEMS") {
            c.tools.groupmems = v;
        }
        c
    }
}
