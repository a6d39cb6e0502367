//! Best-effort discovery of bundle files under a directory or listing page.

use reqwest::Url;

/// `.json` suffix on the path part, ignoring case, query and fragment.
pub fn is_json_location(location: &str) -> bool {
    let path = location
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim();
    path.len() > ".json".len() && path.to_ascii_lowercase().ends_with(".json")
}

/// `*.json` files directly inside `dir`, sorted by path.
pub async fn json_files(dir: &str) -> Vec<String> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) => {
            tracing::debug!(dir, error = %err, "cannot read directory");
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_file = entry
            .file_type()
            .await
            .map(|kind| kind.is_file())
            .unwrap_or(false);
        let path = entry.path();
        if is_file && path.to_str().is_some_and(is_json_location) {
            found.push(path);
        }
    }

    found.sort();
    found
        .iter()
        .map(|path| path.display().to_string())
        .collect()
}

/// Links ending in `.json` from an HTML listing, resolved against `base`.
///
/// The listing URL is treated as a directory. Duplicates keep their first
/// position.
pub fn json_links(base: &str, html: &str) -> Vec<String> {
    let base = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    let Ok(base) = Url::parse(&base) else {
        return Vec::new();
    };

    let mut links: Vec<String> = Vec::new();
    for href in hrefs(html).filter(|href| is_json_location(href)) {
        let Ok(url) = base.join(href) else {
            continue;
        };
        let url = url.to_string();
        if !links.contains(&url) {
            links.push(url);
        }
    }
    links
}

/// Values of `href="..."` and `href='...'` attributes, in document order.
fn hrefs(html: &str) -> impl Iterator<Item = &str> {
    let lower = html.to_ascii_lowercase();
    let starts: Vec<usize> = lower.match_indices("href=").map(|(at, _)| at).collect();

    starts.into_iter().filter_map(move |at| {
        let rest = &html[at + "href=".len()..];
        let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let value = &rest[1..];
        let end = value.find(quote)?;
        Some(value[..end].trim())
    })
}
