use taslink_transport::{default_pipe_path, PipeListener};

use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::{print_event, OutputFormat};

/// Local environment health checks for the pipe transport.
pub fn run(args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let pipe_path = args.pipe.unwrap_or_else(default_pipe_path);
    let mut healthy = true;

    // Path length: sockaddr_un is tight on every platform we run on.
    let path_len = pipe_path.as_os_str().len();
    if path_len < 100 {
        print_event("path-length", &format!("ok ({path_len} bytes)"), format);
    } else {
        healthy = false;
        print_event(
            "path-length",
            &format!("too long ({path_len} bytes, limit ~104)"),
            format,
        );
    }

    // Parent directory must exist and be writable.
    match pipe_path.parent() {
        Some(dir) if dir.as_os_str().is_empty() || dir.exists() => {
            let probe = dir.join(format!(".taslink-doctor-{}", std::process::id()));
            match std::fs::write(&probe, b"probe") {
                Ok(()) => {
                    let _ = std::fs::remove_file(&probe);
                    print_event("pipe-dir", "writable", format);
                }
                Err(err) => {
                    healthy = false;
                    print_event("pipe-dir", &format!("not writable: {err}"), format);
                }
            }
        }
        _ => {
            healthy = false;
            print_event("pipe-dir", "missing parent directory", format);
        }
    }

    // A pipe path that is already a socket usually means a host is
    // running (or crashed without cleanup; bind handles that case).
    if pipe_path.exists() {
        print_event(
            "pipe-path",
            "exists (host running, or stale socket from a crash)",
            format,
        );
    } else {
        print_event("pipe-path", "free", format);

        // Only probe-bind when nothing could be listening.
        match PipeListener::bind(&pipe_path) {
            Ok(listener) => {
                drop(listener);
                print_event("bind", "ok", format);
            }
            Err(err) => {
                healthy = false;
                print_event("bind", &format!("failed: {err}"), format);
            }
        }
    }

    if healthy {
        print_event("doctor", "all checks passed", format);
        Ok(SUCCESS)
    } else {
        Ok(HEALTH_CHECK_FAILED)
    }
}
