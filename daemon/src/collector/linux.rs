use super::{ProcessCollector, ProcessCounters, ProcessHandle};
use crate::error::CollectError;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::time::Duration;
use tracing::debug;

/// Fields of `/proc/<pid>/stat` the sampler cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatFields {
    pub name: String,
    pub state: char,
    pub utime_ticks: u64,
    pub stime_ticks: u64,
    pub start_ticks: u64,
}

impl StatFields {
    pub fn is_dead(&self) -> bool {
        matches!(self.state, 'Z' | 'X' | 'x')
    }
}

/// Memory figures from `/proc/<pid>/status`, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusMemory {
    pub vm_swap: u64,
    pub vm_rss: u64,
    pub vm_data: u64,
}

/// Parses a stat line. The command name sits in parentheses and may itself
/// contain spaces or parentheses, so fields are counted from the last `)`.
pub fn parse_stat(content: &str) -> Option<StatFields> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    if close < open {
        return None;
    }
    let name = content[open + 1..close].to_string();
    let rest: Vec<&str> = content[close + 1..].split_whitespace().collect();
    // rest[0] is field 3 (state); utime/stime are fields 14/15, starttime 22
    if rest.len() < 20 {
        return None;
    }
    Some(StatFields {
        name,
        state: rest[0].chars().next()?,
        utime_ticks: rest[11].parse().ok()?,
        stime_ticks: rest[12].parse().ok()?,
        start_ticks: rest[19].parse().ok()?,
    })
}

/// Kernel threads and zombies carry no `Vm*` lines; those read as zero.
pub fn parse_status_memory(content: &str) -> StatusMemory {
    StatusMemory {
        vm_swap: status_kb_bytes(content, "VmSwap:").unwrap_or(0),
        vm_rss: status_kb_bytes(content, "VmRSS:").unwrap_or(0),
        vm_data: status_kb_bytes(content, "VmData:").unwrap_or(0),
    }
}

fn status_kb_bytes(status: &str, key: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix(key))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|kb| kb.saturating_mul(1024))
}

fn ticks_to_duration(ticks: u64, clock_ticks: u64) -> Duration {
    Duration::from_secs(ticks / clock_ticks)
        + Duration::from_nanos((ticks % clock_ticks) * 1_000_000_000 / clock_ticks)
}

fn open_error(err: io::Error) -> CollectError {
    match err.kind() {
        io::ErrorKind::NotFound => CollectError::NotFound,
        io::ErrorKind::PermissionDenied => CollectError::AccessDenied(err.to_string()),
        _ if err.raw_os_error() == Some(libc::ESRCH) => CollectError::NotFound,
        _ => CollectError::Io(err),
    }
}

fn reread(file: &mut File) -> io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

pub struct LinuxProcessCollector {
    clock_ticks: u64,
    num_cpus: usize,
}

impl LinuxProcessCollector {
    pub fn new() -> Self {
        let clock_ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        let num_cpus = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        Self {
            clock_ticks: if clock_ticks > 0 { clock_ticks as u64 } else { 100 },
            num_cpus: if num_cpus > 0 { num_cpus as usize } else { 1 },
        }
    }
}

impl Default for LinuxProcessCollector {
    fn default() -> Self { Self::new() }
}

impl ProcessCollector for LinuxProcessCollector {
    fn open(&self, pid: u32) -> Result<Box<dyn ProcessHandle>, CollectError> {
        if pid == 0 {
            return Err(CollectError::NotFound);
        }
        let mut stat = File::open(format!("/proc/{}/stat", pid)).map_err(open_error)?;
        let status = File::open(format!("/proc/{}/status", pid)).map_err(open_error)?;

        let fields = reread(&mut stat)
            .map_err(open_error)
            .and_then(|s| parse_stat(&s).ok_or(CollectError::NotFound))?;
        if fields.is_dead() {
            return Err(CollectError::NotFound);
        }
        debug!("Opened /proc handle for PID {} ({})", pid, fields.name);

        Ok(Box::new(LinuxProcessHandle {
            pid,
            stat,
            status,
            start_ticks: fields.start_ticks,
            clock_ticks: self.clock_ticks,
        }))
    }

    fn logical_cpus(&self) -> usize {
        self.num_cpus
    }
}

/// Keeps the process's stat and status files open. Once the process is
/// reaped the kernel fails reads on these descriptors even if the pid is
/// reused, and the start time check catches anything that slips through.
struct LinuxProcessHandle {
    pid: u32,
    stat: File,
    status: File,
    start_ticks: u64,
    clock_ticks: u64,
}

impl ProcessHandle for LinuxProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn refresh(&mut self) -> Result<ProcessCounters, CollectError> {
        let stat = reread(&mut self.stat).map_err(|_| CollectError::Exited)?;
        let fields = parse_stat(&stat).ok_or(CollectError::Exited)?;
        if fields.is_dead() || fields.start_ticks != self.start_ticks {
            return Err(CollectError::Exited);
        }
        let status = reread(&mut self.status).map_err(|_| CollectError::Exited)?;
        let memory = parse_status_memory(&status);

        Ok(ProcessCounters {
            name: fields.name,
            cpu_time: ticks_to_duration(
                fields.utime_ticks + fields.stime_ticks,
                self.clock_ticks,
            ),
            paged_bytes: memory.vm_swap,
            working_set_bytes: memory.vm_rss,
            private_bytes: memory.vm_data,
        })
    }
}

impl Drop for LinuxProcessHandle {
    fn drop(&mut self) {
        debug!("Released /proc handle for PID {}", self.pid);
    }
}
