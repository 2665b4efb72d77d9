//! Parsers for MLSD fact lines and `LIST` output (Unix `ls -l` and DOS/IIS).

use super::{Entry, EntryKind};

/// Parse one MLSD line: `fact=value;fact=value; name`.
pub fn parse_mlsd_line(line: &str) -> Option<Entry> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (facts, name) = line.split_once(' ')?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }

    let mut kind = EntryKind::File;
    let mut size = 0u64;
    let mut modified = None;

    for fact in facts.split(';').filter(|f| !f.is_empty()) {
        let Some((key, value)) = fact.split_once('=') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "type" => {
                let value = value.to_ascii_lowercase();
                kind = match value.as_str() {
                    "dir" => EntryKind::Dir,
                    "file" => EntryKind::File,
                    "cdir" | "pdir" => return None,
                    v if v.starts_with("os.unix=slink") || v.starts_with("os.unix=symlink") => {
                        EntryKind::Link
                    }
                    _ => EntryKind::File,
                };
            }
            "size" | "sizd" => size = value.parse().unwrap_or(0),
            "modify" => modified = Some(value.to_string()),
            _ => {}
        }
    }

    Some(Entry {
        name: name.to_string(),
        kind,
        size,
        modified,
    })
}

/// Parse one `LIST` line in either Unix or DOS format.
pub fn parse_list_line(line: &str) -> Option<Entry> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() || line.starts_with("total ") {
        return None;
    }
    let first = line.chars().next()?;
    if first.is_ascii_digit() {
        parse_dos_line(line)
    } else {
        parse_unix_line(line)
    }
}

fn parse_unix_line(line: &str) -> Option<Entry> {
    let (fields, rest) = split_fields(line, 8)?;
    let perms = fields[0];
    let kind = match perms.chars().next()? {
        'd' => EntryKind::Dir,
        'l' => EntryKind::Link,
        _ => EntryKind::File,
    };
    let mut name = rest;
    if kind == EntryKind::Link
        && let Some((link, _target)) = name.split_once(" -> ")
    {
        name = link;
    }
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(Entry {
        name: name.to_string(),
        kind,
        size: fields[4].parse().unwrap_or(0),
        modified: Some(fields[5..8].join(" ")),
    })
}

fn parse_dos_line(line: &str) -> Option<Entry> {
    let (fields, rest) = split_fields(line, 3)?;
    if rest.is_empty() || rest == "." || rest == ".." {
        return None;
    }
    let (kind, size) = if fields[2].eq_ignore_ascii_case("<DIR>") {
        (EntryKind::Dir, 0)
    } else {
        (EntryKind::File, fields[2].parse().ok()?)
    };
    Some(Entry {
        name: rest.to_string(),
        kind,
        size,
        modified: Some(format!("{} {}", fields[0], fields[1])),
    })
}

/// Split off the first `n` whitespace-separated fields and return the
/// remainder verbatim, so names containing spaces survive.
fn split_fields(line: &str, n: usize) -> Option<(Vec<&str>, &str)> {
    let mut fields = Vec::with_capacity(n);
    let mut rest = line.trim_start();
    while fields.len() < n {
        let end = rest.find(char::is_whitespace)?;
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    Some((fields, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mlsd_file_and_dir() {
        let f = parse_mlsd_line("type=file;size=2048;modify=20250807101500;perm=adfrw; index.html")
            .unwrap();
        assert_eq!(f.name, "index.html");
        assert_eq!(f.kind, EntryKind::File);
        assert_eq!(f.size, 2048);
        assert_eq!(f.modified.as_deref(), Some("20250807101500"));

        let d = parse_mlsd_line("Type=dir;Modify=20250101000000; api").unwrap();
        assert_eq!(d.kind, EntryKind::Dir);
        assert_eq!(d.name, "api");
    }

    #[test]
    fn mlsd_skips_current_and_parent() {
        assert!(parse_mlsd_line("type=cdir;modify=20250101000000; .").is_none());
        assert!(parse_mlsd_line("type=pdir;modify=20250101000000; ..").is_none());
    }

    #[test]
    fn mlsd_keeps_spaces_in_names_and_detects_links() {
        let e = parse_mlsd_line("type=file;size=1; my report.pdf").unwrap();
        assert_eq!(e.name, "my report.pdf");
        let l = parse_mlsd_line("type=OS.unix=slink:/www/aze;size=8; current").unwrap();
        assert_eq!(l.kind, EntryKind::Link);
    }

    #[test]
    fn unix_list_lines() {
        let d = parse_list_line("drwxr-xr-x    4 ftp10454 ftpgroup     4096 Aug 07 10:15 api").unwrap();
        assert_eq!(d.kind, EntryKind::Dir);
        assert_eq!(d.name, "api");

        let f =
            parse_list_line("-rw-r--r--    1 ftp10454 ftpgroup     1234 Jan 01  2025 health check.php")
                .unwrap();
        assert_eq!(f.kind, EntryKind::File);
        assert_eq!(f.size, 1234);
        assert_eq!(f.name, "health check.php");
        assert_eq!(f.modified.as_deref(), Some("Jan 01 2025"));
    }

    #[test]
    fn unix_symlink_strips_target() {
        let l = parse_list_line("lrwxrwxrwx 1 u g 9 Jan 01 12:00 current -> /www/aze").unwrap();
        assert_eq!(l.kind, EntryKind::Link);
        assert_eq!(l.name, "current");
    }

    #[test]
    fn list_skips_totals_and_dot_entries() {
        assert!(parse_list_line("total 24").is_none());
        assert!(parse_list_line("drwxr-xr-x 2 u g 4096 Jan 01 12:00 .").is_none());
        assert!(parse_list_line("drwxr-xr-x 2 u g 4096 Jan 01 12:00 ..").is_none());
        assert!(parse_list_line("garbage").is_none());
    }

    #[test]
    fn dos_list_lines() {
        let d = parse_list_line("08-07-25  10:15AM       <DIR>          assets").unwrap();
        assert_eq!(d.kind, EntryKind::Dir);
        assert_eq!(d.name, "assets");
        let f = parse_list_line("08-07-25  10:15AM                 1530 index.html").unwrap();
        assert_eq!(f.size, 1530);
        assert_eq!(f.kind, EntryKind::File);
    }
}
