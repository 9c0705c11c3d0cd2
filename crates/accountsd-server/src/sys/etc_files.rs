//! Readers for the local files databases (`/etc/group`, `/etc/passwd`).

use crate::group::{GroupEntry, UserRef};
use std::fs;
use std::path::Path;

pub fn read_group_file<P: AsRef<Path>>(path: P) -> std::io::Result<Vec<GroupEntry>> {
    Ok(parse_group(&fs::read_to_string(path)?))
}

pub fn read_passwd_file<P: AsRef<Path>>(path: P) -> std::io::Result<Vec<UserRef>> {
    Ok(parse_passwd(&fs::read_to_string(path)?))
}

/// `name:password:gid:member,member`
pub fn parse_group(content: &str) -> Vec<GroupEntry> {
    records(content)
        .filter_map(|(lineno, fields)| {
            if fields.len() < 4 {
                tracing::debug!(lineno, "short group line skipped");
                return None;
            }
            let gid = fields[2].parse().ok().or_else(|| {
                tracing::debug!(lineno, "bad gid skipped");
                None
            })?;
            let members = fields[3]
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
            Some(GroupEntry {
                name: fields[0].to_string(),
                gid,
                members,
            })
        })
        .collect()
}

/// `name:password:uid:gid:gecos:home:shell`
pub fn parse_passwd(content: &str) -> Vec<UserRef> {
    records(content)
        .filter_map(|(lineno, fields)| {
            if fields.len() < 7 {
                tracing::debug!(lineno, "short passwd line skipped");
                return None;
            }
            let uid = fields[2].parse().ok()?;
            Some(UserRef::new(uid, fields[0]))
        })
        .collect()
}

fn records(content: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    content
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end()))
        // compat entries (+/-) point at other databases
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#') && !l.starts_with(|c: char| c == '+' || c == '-'))
        .map(|(i, l)| (i, l.split(':').collect::<Vec<_>>()))
        .filter(|(_, f)| !f[0].is_empty())
}
