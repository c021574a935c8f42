//! Directory listing page: pure string templating, no I/O.
//!
//! Identical entry lists and paths always produce byte-identical output, so
//! everything here is unit-testable without a network.

use std::cmp::Ordering;
use std::fmt::Write;

use crate::provider::{Entry, EntryKind};

const PAGE_STYLE: &str = r#":root { --bg-color: #1e1e1e; --text-color: #e0e0e0; --link-color: #90caf9; --border-color: #333; --search-bg: #333; --header-color: #bb86fc; --size-color: #888; --download-bg: #03dac6; --download-text: #000; }
body{font-family:-apple-system,BlinkMacSystem-Font,"Segoe UI",Roboto,Helvetica,Arial,sans-serif;margin:0;background:var(--bg-color);color:var(--text-color)}
#container{max-width:900px;margin:0 auto;padding:20px}
#header{display:flex;flex-wrap:wrap;justify-content:space-between;align-items:center;margin-bottom:20px;gap:15px}
#folder-path{font-size:1.2em;color:var(--header-color);word-break:break-all}
#folder-path a{color:var(--link-color);text-decoration:none}
#folder-path a:hover{text-decoration:underline}
#search{padding:10px;border:1px solid var(--border-color);border-radius:5px;width:250px;font-size:1em;background:var(--search-bg);color:var(--text-color)}
#search::placeholder{color:#aaa}
#file-list{list-style:none;padding:0;margin:0;border:1px solid var(--border-color);border-radius:5px;background:var(--bg-color)}
#file-list li{display:flex;align-items:center;padding:12px 15px;border-bottom:1px solid var(--border-color)}
#file-list li:last-child{border-bottom:none}
#file-list .file-info{flex-grow:1;min-width:0;white-space:nowrap;overflow:hidden;text-overflow:ellipsis}
#file-list .file-info a{text-decoration:none;color:var(--link-color);font-weight:500}
#file-list .file-info a:hover{text-decoration:underline}
.file-size{color:var(--size-color);margin:0 15px;white-space:nowrap}
#file-list .download{padding:6px 12px;background:var(--download-bg);color:var(--download-text);border-radius:5px;text-decoration:none;font-size:.9em;white-space:nowrap;font-weight:bold}
#file-list .download:hover{opacity:0.8}
.icon{margin-right:8px}"#;

// Rows whose data-name does not contain the filter text are hidden; the
// parent-directory row is always exempt.
const FILTER_SCRIPT: &str = "const searchInput=document.getElementById('search'),fileList=document.getElementById('file-list');searchInput.addEventListener('input',()=>{const e=searchInput.value.toLowerCase();fileList.querySelectorAll('li').forEach(t=>{if(t.id==='parent-dir-link')return;const n=t.dataset.name||'';t.style.display=n.includes(e)?'flex':'none'})})";

/// Human-readable binary size: repeated division by 1024, two decimals with
/// trailing zeros trimmed.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 6] = ["Bytes", "KB", "MB", "GB", "TB", "PB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let mut text = format!("{value:.2}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    format!("{} {}", text, UNITS[unit])
}

/// Folders before files; within a kind, case-insensitive numeric-aware name
/// order so "file2" sorts before "file10".
pub fn compare_entries(a: &Entry, b: &Entry) -> Ordering {
    match (a.kind, b.kind) {
        (EntryKind::Folder, EntryKind::File) => Ordering::Less,
        (EntryKind::File, EntryKind::Folder) => Ordering::Greater,
        _ => natural_cmp(&a.name, &b.name),
    }
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();
    loop {
        match (a_chars.peek().copied(), b_chars.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let x_digits = take_digits(&mut a_chars);
                let y_digits = take_digits(&mut b_chars);
                match cmp_digit_runs(&x_digits, &y_digits) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            (Some(x), Some(y)) => {
                match x.to_lowercase().cmp(y.to_lowercase()) {
                    Ordering::Equal => {}
                    other => return other,
                }
                a_chars.next();
                b_chars.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(*c);
        chars.next();
    }
    digits
}

/// Compare two digit runs by numeric value without parsing, so arbitrarily
/// long runs cannot overflow.
fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
    let a_trimmed = a.trim_start_matches('0');
    let b_trimmed = b.trim_start_matches('0');
    a_trimmed
        .len()
        .cmp(&b_trimmed.len())
        .then_with(|| a_trimmed.cmp(b_trimmed))
        .then_with(|| a.len().cmp(&b.len()))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Parent-directory link target: the path with its last segment removed,
/// root when no segments remain, `None` at the root itself.
pub fn parent_href(path: &str) -> Option<String> {
    if path.is_empty() || path == "/" {
        return None;
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() <= 1 {
        return Some("/".to_string());
    }
    Some(format!("/{}/", segments[..segments.len() - 1].join("/")))
}

/// Breadcrumb trail: "Root" linked to `/`, then one cumulative link per
/// path segment.
pub fn breadcrumbs(path: &str) -> String {
    let mut html = String::from(r#"<a href="/">Root</a>"#);
    let mut cumulative = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        cumulative.push('/');
        cumulative.push_str(segment);
        let _ = write!(
            html,
            r#" / <a href="{}/">{}</a>"#,
            escape_html(&cumulative),
            escape_html(segment)
        );
    }
    html
}

fn entry_row(entry: &Entry) -> String {
    let is_folder = entry.kind == EntryKind::Folder;
    let icon = if is_folder { "📁" } else { "📄" };
    let href = if is_folder {
        escape_html(&format!("{}/", entry.path_lower))
    } else {
        escape_html(&entry.path_lower)
    };
    let name = escape_html(&entry.name);
    let data_name = escape_html(&entry.name.to_lowercase());

    let mut row = format!(
        r#"<li data-name="{data_name}"><div class="file-info"><a href="{href}"><span class="icon">{icon}</span> {name}</a></div>"#
    );
    if !is_folder {
        let _ = write!(
            row,
            r#"<span class="file-size">{}</span><a href="{href}" class="download">Download</a>"#,
            format_bytes(entry.size)
        );
    }
    row.push_str("</li>");
    row
}

/// Render the full listing document for a directory.
pub fn directory_page(entries: &[Entry], path: &str) -> String {
    let mut sorted: Vec<&Entry> = entries.iter().collect();
    sorted.sort_by(|a, b| compare_entries(a, b));

    let mut rows = String::new();
    if let Some(parent) = parent_href(path) {
        let _ = write!(
            rows,
            r#"<li id="parent-dir-link"><a href="{}"><span class="icon">📁</span> ..</a></li>"#,
            escape_html(&parent)
        );
    }
    for entry in sorted {
        rows.push_str(&entry_row(entry));
    }

    format!(
        r#"<!DOCTYPE html><html><head><title>Dropbox Index</title><meta name="viewport" content="width=device-width, initial-scale=1.0">
<style>
{PAGE_STYLE}
</style>
</head><body><div id="container"><div id="header"><h1 id="folder-path">{breadcrumbs}</h1><input type="text" id="search" placeholder="Search this directory..."></div>
<ul id="file-list">{rows}</ul></div>
<script>{FILTER_SCRIPT}</script>
</body></html>"#,
        breadcrumbs = breadcrumbs(path),
    )
}
