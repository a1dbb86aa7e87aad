//! CLI output for `shelf list` and `shelf show`.

use anyhow::Result;

use crate::index::Library;
use crate::search::{sort_documents, SortKey};

/// CLI: `shelf list`.
pub fn run_list(library: &Library, format: &str, sort: &str, shelf: Option<&str>) -> Result<()> {
    let mut documents = library.list_documents(shelf)?;
    if documents.is_empty() {
        println!("No documents in the library yet.");
        return Ok(());
    }
    sort_documents(&mut documents, SortKey::parse(sort)?);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&documents)?);
        }
        "table" => {
            println!(
                "{:<32} {:<40} {:<24} {:>5}  {:<19}  {}",
                "ID", "Title", "Author", "Pages", "Uploaded", "Readers"
            );
            for d in &documents {
                let title = clip(&d.title, 40);
                let author = clip(&d.author, 24);
                let uploaded = d.uploaded_date.chars().take(19).collect::<String>();
                println!(
                    "{:<32} {:<40} {:<24} {:>5}  {:<19}  {}",
                    d.document_id,
                    title,
                    author,
                    d.page_count,
                    uploaded,
                    d.readers_used.join(", ")
                );
            }
        }
        other => anyhow::bail!("Unknown format: {}. Use table or json.", other),
    }
    Ok(())
}

/// CLI: `shelf show`. Prints the rendered Markdown summary; `--raw` prints
/// the archived plain text instead.
pub fn run_show(library: &Library, document_id: &str, raw: bool) -> Result<()> {
    let content = if raw {
        library.store().read_text(document_id)?
    } else {
        library.store().read_markdown(document_id)?
    };
    println!("{}", content);
    Ok(())
}

fn clip(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let clipped: String = value.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", clipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_preserves_short_values_and_shortens_long_ones() {
        assert_eq!(clip("short", 10), "short");
        let clipped = clip("a very long title that keeps going", 10);
        assert_eq!(clipped.chars().count(), 10);
        assert!(clipped.ends_with('…'));
    }
}
