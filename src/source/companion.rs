//! Companion-file name resolution. Pure string manipulation over source names,
//! accepting both `/` and `\` separators since hosts hand over either.

use super::ByteSource;

fn last_separator(name: &str) -> Option<usize> {
    name.rfind(|c| c == '/' || c == '\\')
}

/// File name without any directory part
pub fn file_name(name: &str) -> &str {
    match last_separator(name) {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Extension after the last dot of the file name, or empty
pub fn filename_extension(name: &str) -> &str {
    let file = file_name(name);
    match file.rfind('.') {
        Some(pos) => &file[pos + 1..],
        None => "",
    }
}

/// File name without directory or extension
pub fn base_name(name: &str) -> &str {
    let file = file_name(name);
    match file.rfind('.') {
        Some(pos) => &file[..pos],
        None => file,
    }
}

/// Directory part including the trailing separator, or empty
pub fn parent_path(name: &str) -> &str {
    match last_separator(name) {
        Some(pos) => &name[..=pos],
        None => "",
    }
}

/// Replace the extension, or append one when the name has none
pub fn swap_extension(name: &str, ext: &str) -> String {
    let file = file_name(name);
    match file.rfind('.') {
        Some(pos) => {
            let cut = name.len() - file.len() + pos;
            format!("{}.{}", &name[..cut], ext)
        }
        None => format!("{}.{}", name, ext),
    }
}

/// Resolve `filename` relative to the directory of `stream_name`.
/// Handles `./name` and one level of `../name`.
pub fn resolve_sibling(stream_name: &str, filename: &str) -> String {
    let Some(sep_pos) = last_separator(stream_name) else {
        return filename.to_string();
    };
    let sep = stream_name[sep_pos..].chars().next().unwrap_or('/');
    let mut dir = stream_name[..=sep_pos].to_string();
    let part: String = filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { sep } else { c })
        .collect();

    let dot = format!(".{}", sep);
    let dotdot = format!("..{}", sep);

    let name = if let Some(rest) = part.strip_prefix(&dotdot) {
        let trimmed = &dir[..dir.len() - 1];
        match last_separator(trimmed) {
            Some(prev) => {
                dir.truncate(prev + 1);
                rest.to_string()
            }
            None => part.clone(),
        }
    } else if let Some(rest) = part.strip_prefix(&dot) {
        rest.to_string()
    } else {
        part.clone()
    };

    dir.push_str(&name);
    dir
}

/// Case-insensitive match of the name's extension against a comma list ("wem,wav")
pub fn check_extensions(name: &str, extensions: &str) -> bool {
    let ext = filename_extension(name);
    extensions.split(',').any(|candidate| candidate.eq_ignore_ascii_case(ext))
}

/// Open the file next to `source` with the same base name and another extension
pub fn open_by_ext(source: &dyn ByteSource, ext: &str) -> Option<Box<dyn ByteSource>> {
    source.open_sibling(&swap_extension(source.name(), ext))
}

/// Open a file named relative to `source`'s directory
pub fn open_by_filename(source: &dyn ByteSource, filename: &str) -> Option<Box<dyn ByteSource>> {
    if filename.is_empty() {
        return None;
    }
    source.open_sibling(&resolve_sibling(source.name(), filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_parts() {
        assert_eq!(file_name("dir/sub/bgm.gsb"), "bgm.gsb");
        assert_eq!(file_name("C:\\game\\bgm.gsb"), "bgm.gsb");
        assert_eq!(file_name("bgm.gsb"), "bgm.gsb");
        assert_eq!(filename_extension("dir.x/bgm"), "");
        assert_eq!(filename_extension("dir/bgm.WEM"), "WEM");
        assert_eq!(base_name("dir/bgm.tar.gsb"), "bgm.tar");
        assert_eq!(parent_path("dir/sub/bgm.gsb"), "dir/sub/");
        assert_eq!(parent_path("bgm.gsb"), "");
    }

    #[test]
    fn test_swap_extension() {
        assert_eq!(swap_extension("dir/bgm.gsb", "gsp"), "dir/bgm.gsp");
        assert_eq!(swap_extension("dir.v2/bgm", "gsp"), "dir.v2/bgm.gsp");
        assert_eq!(swap_extension("bgm.", "gsp"), "bgm.gsp");
    }

    #[test]
    fn test_resolve_sibling() {
        assert_eq!(resolve_sibling("a/b/c.gsb", "d.gsp"), "a/b/d.gsp");
        assert_eq!(resolve_sibling("a/b/c.gsb", "./d.gsp"), "a/b/d.gsp");
        assert_eq!(resolve_sibling("a/b/c.gsb", "../d.gsp"), "a/d.gsp");
        assert_eq!(resolve_sibling("a\\b\\c.gsb", "x/d.gsp"), "a\\b\\x\\d.gsp");
        assert_eq!(resolve_sibling("c.gsb", "d.gsp"), "d.gsp");
        // no directory above to strip: leave the relative part for the host
        assert_eq!(resolve_sibling("b/c.gsb", "../d.gsp"), "b/../d.gsp");
    }

    #[test]
    fn test_check_extensions() {
        assert!(check_extensions("x/music.WEM", "wem,wav,lwav"));
        assert!(check_extensions("music.lwav", "wem,wav,lwav"));
        assert!(!check_extensions("music.wavx", "wem,wav"));
        assert!(!check_extensions("music", "wem,wav"));
    }
}
