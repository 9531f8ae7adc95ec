//! POSIX-style path strings.
//!
//! The storage core exchanges paths as `/`-separated strings across every
//! runtime, including Windows hosts and the browser sandbox. These utilities
//! bring externally supplied paths into that shape.

/// Normalize a path to `/` separators with `.` and `..` collapsed.
///
/// Backslashes are treated as separators, repeated separators collapse, and
/// a `..` at the root of an absolute path stays at the root. Relative paths
/// keep their leading `..` components. The empty path normalizes to `"."`.
pub fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            part => parts.push(part),
        }
    }

    match (absolute, parts.is_empty()) {
        (true, _) => format!("/{}", parts.join("/")),
        (false, true) => ".".to_owned(),
        (false, false) => parts.join("/"),
    }
}

/// `true` if the path is absolute once normalized.
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/') || path.starts_with('\\')
}

/// Resolve `path` against `base`: absolute paths stand alone, relative ones
/// are joined onto `base`. The result is normalized.
pub fn resolve(base: &str, path: &str) -> String {
    if is_absolute(path) {
        normalize(path)
    } else {
        normalize(&format!("{base}/{path}"))
    }
}

/// Convert a `file://` URL to a normalized path.
///
/// Returns `None` for URLs of other schemes. Percent-escapes are decoded;
/// a host component is ignored.
pub fn from_file_url(url: &str) -> Option<String> {
    let rest = url.strip_prefix("file://")?;
    // Skip the host component up to the path.
    let path = match rest.find('/') {
        Some(0) => rest,
        Some(i) => &rest[i..],
        None => "/",
    };

    Some(normalize(&percent_decode(path)))
}

fn percent_decode(s: &str) -> String {
    let mut out = Vec::with_capacity(s.len());
    let mut bytes = s.bytes();
    while let Some(b) = bytes.next() {
        if b != b'%' {
            out.push(b);
            continue;
        }
        let hex = [bytes.next(), bytes.next()];
        match hex {
            [Some(hi), Some(lo)] => {
                let decoded = (hi as char)
                    .to_digit(16)
                    .zip((lo as char).to_digit(16))
                    .map(|(hi, lo)| (hi * 16 + lo) as u8);
                match decoded {
                    Some(byte) => out.push(byte),
                    None => out.extend([b'%', hi, lo]),
                }
            }
            _ => out.push(b'%'),
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}
