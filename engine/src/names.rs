//! Name generation for duplicates, links and new folders, and name
//! sanitizing for filesystems with a restricted character set.
//!
//! Duplicate tags look like `foo (copy).txt`, `foo (another copy).txt`,
//! `foo (3rd copy).txt`. All length limits are in bytes; truncation only
//! ever removes whole characters from the base name, never from the tag
//! or the extension.

const COPY_TAG: &str = " (copy)";
const ANOTHER_COPY_TAG: &str = " (another copy)";
const ORDINAL_TAG_ENDINGS: [&str; 4] = ["st copy)", "nd copy)", "rd copy)", "th copy)"];
const MAX_DUPLICATE_COUNT: u64 = 1_000_000;

/// Extensions that keep the extension before them, e.g. `.tar.gz`.
const COMPRESSED_EXTENSIONS: [&str; 6] = [".gz", ".bz2", ".sit", ".Z", ".bz", ".xz"];

/// Filesystem types that reject `/ : ; * ? " < > | \` in names.
const RESTRICTED_FS_TYPES: [&str; 7] = ["fat", "vfat", "msdos", "msdosfs", "exfat", "ntfs", "fuseblk"];
const RESTRICTED_CHARACTERS: &str = "/:;*?\"<>|\\";

/// A name split into base, duplicate tag ordinal and extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateNameParse {
    pub base: String,
    /// Extension including the dot, or empty
    pub suffix: String,
    /// 0 = no tag, 1 = "(copy)", 2 = "(another copy)", N = "(Nth copy)"
    pub count: u64,
}

/// Byte offset of the extension dot, if the name has an extension.
fn extension_offset(name: &str) -> Option<usize> {
    let dot = name.rfind('.')?;
    if dot == 0 || dot + 1 == name.len() {
        return None;
    }

    if COMPRESSED_EXTENSIONS.contains(&&name[dot..]) {
        if let Some(prev) = name[..dot].rfind('.') {
            if prev > 0 {
                return Some(prev);
            }
        }
    }
    Some(dot)
}

/// Find a `" (N<ordinal> copy)"` tag. Returns the tag start and N.
fn find_ordinal_tag(name: &str) -> Option<(usize, u64)> {
    for ending in ORDINAL_TAG_ENDINGS {
        let mut search_end = name.len();
        while let Some(end_pos) = name[..search_end].rfind(ending) {
            if let Some(open) = name[..end_pos].rfind(" (") {
                let digits = &name[open + 2..end_pos];
                if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                    // Too many digits to parse is as out of range as 0.
                    let count = digits.parse::<u64>().unwrap_or(0);
                    return Some((open, count));
                }
            }
            search_end = end_pos;
        }
    }
    None
}

/// Split `name` into base, existing duplicate count and extension.
pub fn parse_duplicate_name(name: &str) -> DuplicateNameParse {
    let suffix_at = extension_offset(name);

    let tag = if let Some(pos) = name.find(COPY_TAG) {
        Some((pos, 1))
    } else if let Some(pos) = name.find(ANOTHER_COPY_TAG) {
        Some((pos, 2))
    } else {
        find_ordinal_tag(name).map(|(pos, count)| {
            if count < 1 || count > MAX_DUPLICATE_COUNT {
                (pos, 0)
            } else {
                (pos, count)
            }
        })
    };

    match tag {
        Some((tag_at, count)) => {
            // A tag after the dot means the "extension" was not one, as in "foo. (copy)".
            let suffix = match suffix_at {
                Some(dot) if dot > tag_at => name[dot..].to_string(),
                _ => String::new(),
            };
            DuplicateNameParse {
                base: name[..tag_at].to_string(),
                suffix,
                count,
            }
        }
        None => match suffix_at {
            Some(dot) => DuplicateNameParse {
                base: name[..dot].to_string(),
                suffix: name[dot..].to_string(),
                count: 0,
            },
            None => DuplicateNameParse {
                base: name.to_string(),
                suffix: String::new(),
                count: 0,
            },
        },
    }
}

fn ordinal_suffix(count: u64) -> &'static str {
    if (11..=13).contains(&(count % 100)) {
        return "th";
    }
    match count % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

fn duplicate_tag(count: u64) -> String {
    match count {
        0 | 1 => COPY_TAG.to_string(),
        2 => ANOTHER_COPY_TAG.to_string(),
        n => format!(" ({}{} copy)", n, ordinal_suffix(n)),
    }
}

/// Remove whole characters from the end of `text` until at least
/// `reduce_by` bytes are gone. `None` if nothing would be left.
fn shorten_utf8(text: &str, reduce_by: usize) -> Option<&str> {
    if reduce_by >= text.len() {
        return None;
    }
    let mut cut = text.len() - reduce_by;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    if cut == 0 {
        None
    } else {
        Some(&text[..cut])
    }
}

/// Build `render(part)`, shortening `part` so the result fits in
/// `max_length` bytes. If `part` would vanish it is rendered empty.
fn fit_to_length(part: &str, max_length: Option<usize>, render: impl Fn(&str) -> String) -> String {
    let result = render(part);
    match max_length {
        Some(max) if max > 0 && result.len() > max => {
            let excess = result.len() - max;
            render(shorten_utf8(part, excess).unwrap_or(""))
        }
        _ => result,
    }
}

/// The next name in the duplicate sequence after `name`.
///
/// `next_duplicate_name("foo", 1, None) == "foo (copy)"`,
/// `next_duplicate_name("foo (copy).txt", 1, None) == "foo (another copy).txt"`.
pub fn next_duplicate_name(name: &str, increment: u64, max_length: Option<usize>) -> String {
    let parsed = parse_duplicate_name(name);
    let count = (parsed.count + increment).max(1);
    let tag = duplicate_tag(count);

    fit_to_length(&parsed.base, max_length, |base| format!("{}{}{}", base, tag, parsed.suffix))
}

/// Name for the `count`-th symlink to `name`: `name`, `Link to name`,
/// `Another link to name`, `3rd link to name`, ...
pub fn next_link_name(name: &str, count: u64, max_length: Option<usize>) -> String {
    let render = |target: &str| match count {
        0 => target.to_string(),
        1 => format!("Link to {}", target),
        2 => format!("Another link to {}", target),
        n => format!("{}{} link to {}", n, ordinal_suffix(n), target),
    };
    fit_to_length(name, max_length, render)
}

/// `name N`, used for directories created by the create job.
pub fn next_folder_name(name: &str, number: u64, max_length: Option<usize>) -> String {
    fit_to_length(name, max_length, |base| format!("{} {}", base, number))
}

/// Strip the extension: `archive.tar.gz` -> (`archive`, `.tar.gz`).
pub fn split_extension(name: &str) -> (&str, &str) {
    match extension_offset(name) {
        Some(dot) => (&name[..dot], &name[dot..]),
        None => (name, ""),
    }
}

/// True if names on this filesystem type have a restricted character set.
pub fn fs_type_is_restricted(fs_type: &str) -> bool {
    RESTRICTED_FS_TYPES.contains(&fs_type)
}

/// Rewrite `name` so it is acceptable on a filesystem of `fs_type`.
/// Unknown or unrestricted types leave the name unchanged.
pub fn make_name_valid_for_fs(name: &str, fs_type: Option<&str>) -> String {
    let Some(fs_type) = fs_type else {
        return name.to_string();
    };
    if !fs_type_is_restricted(fs_type) {
        return name.to_string();
    }

    let replaced: String = name
        .chars()
        .map(|c| if RESTRICTED_CHARACTERS.contains(c) { '_' } else { c })
        .collect();

    let trimmed = replaced.trim_end_matches([' ', '.']);
    if trimmed.is_empty() {
        replaced
    } else {
        trimmed.to_string()
    }
}

/// True if `name` names an entry directly inside a folder: non-empty,
/// no path separator, and neither `.` nor `..`.
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(std::path::MAIN_SEPARATOR) && !name.contains('/')
}
