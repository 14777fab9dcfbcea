use regex::Regex;
use std::sync::OnceLock;

use super::ansi::detection_window;

/// Node inspector port; debugger banners are never a preview.
const DEBUGGER_PORT: &str = "9229";

const URL_TRAILING_JUNK: &[char] = &['*', ')', ']', '}', '>', ',', '"', '\'', '`', '.'];

fn added_dir_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Added (/.*?) as a working directory").expect("valid added-dir regex")
    })
}

fn full_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"https?://(?:localhost|127\.0\.0\.1|0\.0\.0\.0):(\d+)\S*")
            .expect("valid url regex")
    })
}

fn bare_host_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^/\w.])((?:localhost|127\.0\.0\.1|0\.0\.0\.0):(\d{2,5})(?:/\S*)?)")
            .expect("valid host:port regex")
    })
}

/// Path from an "Added <path> as a working directory" notice.
pub fn detect_added_directory(raw: &str) -> Option<String> {
    let window = detection_window(raw);
    let caps = added_dir_regex().captures(&window)?;
    let path = caps[1].trim();
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

/// First local preview URL in the output window.
pub fn detect_url(raw: &str) -> Option<String> {
    let window = detection_window(raw);

    for caps in full_url_regex().captures_iter(&window) {
        if &caps[1] == DEBUGGER_PORT {
            continue;
        }
        let url = caps[0].trim_end_matches(URL_TRAILING_JUNK);
        return Some(url.to_string());
    }

    for caps in bare_host_regex().captures_iter(&window) {
        if &caps[2] == DEBUGGER_PORT {
            continue;
        }
        let host_port = caps[1].trim_end_matches(URL_TRAILING_JUNK);
        return Some(format!("http://{host_port}"));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_added_directory_plain_message() {
        assert_eq!(
            detect_added_directory("Added /Users/me/shared lib/ as a working directory for this session"),
            Some("/Users/me/shared lib".to_string())
        );
    }

    #[test]
    fn detect_added_directory_tolerates_ansi_and_cursor_moves() {
        let plain = "Added /srv/data/my project as a working directory.";
        let decorated = "\x1b[32m\x1b[1mAdded\x1b[1C/srv/data/my\x1b[1Cproject\x1b[22m as a working\x1b[1Cdirectory.\x1b[0m";
        assert_eq!(detect_added_directory(decorated), detect_added_directory(plain));
        assert_eq!(
            detect_added_directory(decorated),
            Some("/srv/data/my project".to_string())
        );
    }

    #[test]
    fn detect_added_directory_none_without_message() {
        assert_eq!(detect_added_directory("Added files to the index"), None);
    }

    #[test]
    fn detect_url_prefers_full_local_url_and_trims_junk() {
        assert_eq!(
            detect_url("  ➜  Local:   **http://localhost:5173/**"),
            Some("http://localhost:5173/".to_string())
        );
        assert_eq!(
            detect_url("Server ready (http://127.0.0.1:3000)."),
            Some("http://127.0.0.1:3000".to_string())
        );
    }

    #[test]
    fn detect_url_synthesizes_bare_host_port() {
        assert_eq!(
            detect_url("listening on 0.0.0.0:8080"),
            Some("http://0.0.0.0:8080".to_string())
        );
    }

    #[test]
    fn detect_url_ignores_debugger_port() {
        assert_eq!(
            detect_url("Debugger listening on ws://127.0.0.1:9229/abc"),
            None,
            "detect_url: the inspector port is never a preview"
        );
        assert_eq!(
            detect_url("Debugger on http://localhost:9229 then app on http://localhost:4000"),
            Some("http://localhost:4000".to_string())
        );
    }

    #[test]
    fn detect_url_ignores_remote_hosts() {
        assert_eq!(detect_url("see https://example.com:443/docs"), None);
    }
}
