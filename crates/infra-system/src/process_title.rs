// OS-visible process name, so `ps`/`top` tell workers apart

use lightq_core::domain::WorkerId;
use tracing::debug;

/// Longest name the kernel keeps (`TASK_COMM_LEN` minus the NUL)
pub const MAX_TITLE_BYTES: usize = 15;

/// Title of the supervisor process
pub const MASTER_TITLE: &str = "lightq:master";

/// Title of a worker process: `lq:<number>:<queue>`.
///
/// The worker number comes first so it survives truncation of long queue names.
pub fn worker_title(worker: &WorkerId) -> String {
    format!("lq:{}:{}", worker.number, worker.queue)
}

/// Cut `title` to [`MAX_TITLE_BYTES`] on a character boundary
fn truncate_title(title: &str) -> &str {
    if title.len() <= MAX_TITLE_BYTES {
        return title;
    }
    let mut end = MAX_TITLE_BYTES;
    while !title.is_char_boundary(end) {
        end -= 1;
    }
    &title[..end]
}

/// Set the process name shown by `ps`, truncated to [`MAX_TITLE_BYTES`].
///
/// prctl names the calling thread, so call this from the main thread,
/// i.e. directly inside `main`, not from a spawned task.
#[cfg(target_os = "linux")]
pub fn set_process_title(title: &str) {
    use std::ffi::CString;

    let sanitized: String = title.chars().filter(|c| *c != '\0').collect();
    match CString::new(truncate_title(&sanitized)) {
        Ok(name) => {
            if let Err(e) = nix::sys::prctl::set_name(&name) {
                debug!(error = %e, title, "Could not set process title");
            }
        }
        Err(e) => debug!(error = %e, title, "Invalid process title"),
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_process_title(title: &str) {
    debug!(title = truncate_title(title), "Process titles are not supported on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightq_core::domain::QueueName;

    #[test]
    fn test_worker_number_survives_truncation() {
        let worker = WorkerId::new(QueueName::new("notifications").unwrap(), 12).unwrap();
        let title = worker_title(&worker);
        assert_eq!(title, "lq:12:notifications");
        assert_eq!(truncate_title(&title), "lq:12:notificat");
        assert!(MASTER_TITLE.len() <= MAX_TITLE_BYTES);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // 'é' is two bytes and would straddle byte 15
        let title = "lq:1:abcdefghié";
        assert_eq!(title.len(), 16);
        assert_eq!(truncate_title(title), "lq:1:abcdefghi");
        assert_eq!(truncate_title("short"), "short");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_set_process_title() {
        // Runs on its own test thread; prctl(PR_SET_NAME) names only that thread
        set_process_title("lq:3:a-very-long-queue");
        let name = nix::sys::prctl::get_name().unwrap();
        assert_eq!(name.to_str().unwrap(), "lq:3:a-very-lon");
    }
}
