use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// UserDb — the seam between policy decisions and the OS account database
// ---------------------------------------------------------------------------

/// Account lookups the engine and the check driver need. Group order is
/// significant: the primary group comes first, supplementary groups follow
/// in the order the OS enumerates them.
pub trait UserDb {
    fn user_exists(&self, name: &str) -> bool;
    fn group_exists(&self, name: &str) -> bool;
    fn login_shell(&self, name: &str) -> Option<PathBuf>;
    fn groups_of(&self, name: &str) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// SystemUserDb — passwd/group lookups via libc
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SystemUserDb;

impl SystemUserDb {
    pub fn new() -> Self {
        Self
    }
}

struct Passwd {
    shell: PathBuf,
    gid: libc::gid_t,
}

fn getpwnam(name: &str) -> Option<Passwd> {
    let cname = CString::new(name).ok()?;
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0i8; 1024];
    loop {
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let rc = unsafe {
            libc::getpwnam_r(
                cname.as_ptr(),
                &mut pwd,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            return None;
        }
        let shell = unsafe { CStr::from_ptr(pwd.pw_shell) };
        return Some(Passwd {
            shell: PathBuf::from(shell.to_string_lossy().into_owned()),
            gid: pwd.pw_gid,
        });
    }
}

fn getgrnam_exists(name: &str) -> bool {
    let Ok(cname) = CString::new(name) else {
        return false;
    };
    let mut grp: libc::group = unsafe { std::mem::zeroed() };
    let mut buf = vec![0i8; 1024];
    loop {
        let mut result: *mut libc::group = std::ptr::null_mut();
        let rc = unsafe {
            libc::getgrnam_r(
                cname.as_ptr(),
                &mut grp,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        return rc == 0 && !result.is_null();
    }
}

fn group_name(gid: libc::gid_t) -> Option<String> {
    let mut grp: libc::group = unsafe { std::mem::zeroed() };
    let mut buf = vec![0i8; 1024];
    loop {
        let mut result: *mut libc::group = std::ptr::null_mut();
        let rc = unsafe {
            libc::getgrgid_r(
                gid,
                &mut grp,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            return None;
        }
        let name = unsafe { CStr::from_ptr(grp.gr_name) };
        return Some(name.to_string_lossy().into_owned());
    }
}

fn group_ids(name: &str, primary: libc::gid_t) -> Vec<libc::gid_t> {
    let Ok(cname) = CString::new(name) else {
        return Vec::new();
    };
    let mut ngroups: libc::c_int = 32;
    loop {
        let mut groups = vec![0 as libc::gid_t; ngroups as usize];
        let rc = unsafe {
            libc::getgrouplist(cname.as_ptr(), primary, groups.as_mut_ptr(), &mut ngroups)
        };
        if rc == -1 && (ngroups as usize) > groups.len() {
            continue;
        }
        if rc == -1 {
            return Vec::new();
        }
        groups.truncate(ngroups as usize);
        return groups;
    }
}

impl UserDb for SystemUserDb {
    fn user_exists(&self, name: &str) -> bool {
        getpwnam(name).is_some()
    }

    fn group_exists(&self, name: &str) -> bool {
        getgrnam_exists(name)
    }

    fn login_shell(&self, name: &str) -> Option<PathBuf> {
        getpwnam(name).map(|p| p.shell)
    }

    fn groups_of(&self, name: &str) -> Vec<String> {
        let Some(pwd) = getpwnam(name) else {
            return Vec::new();
        };
        let mut names = Vec::new();
        if let Some(primary) = group_name(pwd.gid) {
            names.push(primary);
        }
        for gid in group_ids(name, pwd.gid) {
            if gid == pwd.gid {
                continue;
            }
            if let Some(gname) = group_name(gid) {
                if !names.contains(&gname) {
                    names.push(gname);
                }
            }
        }
        names
    }
}

// ---------------------------------------------------------------------------
// StaticUserDb — seeded account database for tests
// ---------------------------------------------------------------------------

/// Fixed account database. Group membership order is exactly the order the
/// groups were given to `with_user`.
#[derive(Debug, Default)]
pub struct StaticUserDb {
    users: HashMap<String, StaticUser>,
    groups: Vec<String>,
}

#[derive(Debug)]
struct StaticUser {
    shell: PathBuf,
    groups: Vec<String>,
}

impl StaticUserDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, name: &str, shell: &str, groups: &[&str]) -> Self {
        for group in groups {
            if !self.groups.iter().any(|g| g == group) {
                self.groups.push(group.to_string());
            }
        }
        self.users.insert(
            name.to_string(),
            StaticUser {
                shell: PathBuf::from(shell),
                groups: groups.iter().map(|g| g.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_group(mut self, name: &str) -> Self {
        if !self.groups.iter().any(|g| g == name) {
            self.groups.push(name.to_string());
        }
        self
    }
}

impl UserDb for StaticUserDb {
    fn user_exists(&self, name: &str) -> bool {
        self.users.contains_key(name)
    }

    fn group_exists(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g == name)
    }

    fn login_shell(&self, name: &str) -> Option<PathBuf> {
        self.users.get(name).map(|u| u.shell.clone())
    }

    fn groups_of(&self, name: &str) -> Vec<String> {
        self.users
            .get(name)
            .map(|u| u.groups.clone())
            .unwrap_or_default()
    }
}
