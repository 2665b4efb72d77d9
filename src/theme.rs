use crate::remote::{Entry, EntryKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Dir,
    Link,
    Archive,
    Image,
    Document,
    Code,
    Backup,
    Default,
}

pub fn categorize(entry: &Entry) -> FileCategory {
    match entry.kind {
        EntryKind::Dir => return FileCategory::Dir,
        EntryKind::Link => return FileCategory::Link,
        EntryKind::File => {}
    }

    if entry.name.contains(".backup_") || entry.name.contains(".bak") {
        return FileCategory::Backup;
    }

    let ext = entry
        .name
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "zip" | "tar" | "gz" | "bz2" | "xz" | "7z" | "zst" | "tgz" => FileCategory::Archive,
        "jpg" | "jpeg" | "png" | "gif" | "svg" | "webp" | "ico" | "avif" => FileCategory::Image,
        "pdf" | "txt" | "md" | "csv" | "doc" | "docx" | "xls" | "xlsx" => FileCategory::Document,
        "php" | "js" | "mjs" | "ts" | "tsx" | "jsx" | "css" | "html" | "htm" | "json" | "xml"
        | "sql" | "sh" | "py" | "htaccess" | "map" | "toml" | "yaml" | "yml" => FileCategory::Code,
        _ => FileCategory::Default,
    }
}

/// ANSI colored text for CLI output, using eza-style colors.
pub fn cli_colored(text: &str, category: FileCategory) -> String {
    let code = match category {
        FileCategory::Dir => "1;34",      // bold blue
        FileCategory::Link => "36",       // cyan
        FileCategory::Archive => "1;31",  // bold red
        FileCategory::Image => "35",      // magenta
        FileCategory::Document => "1;33", // bold yellow
        FileCategory::Code => "1;32",     // bold green
        FileCategory::Backup => "2",      // dim
        FileCategory::Default => "0",
    };
    format!("\x1b[{}m{}\x1b[0m", code, text)
}
