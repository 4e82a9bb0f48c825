use std::os::unix::net::UnixDatagram;

use sshdo_core::{AuditRecord, AuditSink, Facility};

/// Paths the local syslog daemon may be listening on.
const SOCKET_PATHS: &[&str] = &["/dev/log", "/var/run/syslog"];

/// Audit sink speaking the classic `<PRI>ident[pid]: message` datagram
/// format to the local event-log service. Construction never fails; when
/// no socket is reachable every emit reports the failure and the caller
/// carries on.
pub struct SyslogSink {
    socket: Option<UnixDatagram>,
    facility: Facility,
    pid: u32,
}

impl SyslogSink {
    pub fn new(facility: Facility) -> Self {
        Self {
            socket: connect(),
            facility,
            pid: std::process::id(),
        }
    }
}

fn connect() -> Option<UnixDatagram> {
    let socket = UnixDatagram::unbound().ok()?;
    for path in SOCKET_PATHS {
        if socket.connect(path).is_ok() {
            return Some(socket);
        }
    }
    None
}

impl AuditSink for SyslogSink {
    fn emit(&self, record: &AuditRecord) -> Result<(), String> {
        let Some(socket) = &self.socket else {
            return Err("no syslog socket reachable".to_string());
        };
        let pri = u32::from(self.facility.code()) * 8 + u32::from(record.priority().severity());
        let message = format!("<{}>sshdo[{}]: {}", pri, self.pid, record.render());
        socket
            .send(message.as_bytes())
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
