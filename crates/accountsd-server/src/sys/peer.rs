use std::fs;
use tokio::net::UnixStream;

/// Identity of the process on the other end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    pub uid: u32,
    pub pid: Option<i32>,
    /// Audit login uid of the caller's session, if it has one.
    pub login_uid: Option<u32>,
}

impl Subject {
    pub fn from_stream(stream: &UnixStream) -> std::io::Result<Self> {
        let cred = stream.peer_cred()?;
        let pid = cred.pid();
        Ok(Self {
            uid: cred.uid(),
            pid,
            login_uid: pid.and_then(read_login_uid),
        })
    }
}

const UNSET_LOGIN_UID: u32 = u32::MAX;

fn read_login_uid(pid: i32) -> Option<u32> {
    let raw = fs::read_to_string(format!("/proc/{pid}/loginuid")).ok()?;
    parse_login_uid(&raw)
}

fn parse_login_uid(raw: &str) -> Option<u32> {
    match raw.trim().parse::<u32>() {
        Ok(UNSET_LOGIN_UID) | Err(_) => None,
        Ok(uid) => Some(uid),
    }
}
