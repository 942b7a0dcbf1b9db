//! Search command handler.
//!
//! Answers one query, or runs an interactive prompt loop when no query is
//! given on the command line.

use clap::Args;
use marquee_core::{config::AppConfig, AppResult};
use marquee_index::archive::read_archive;
use marquee_index::{create_provider, search, Corpus, EmbeddingProvider, QueryResult, SearchOptions, Snapshot};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

const PROMPT: &str = "Enter your movie query (or 'quit' to exit): ";

/// Query the index
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text (omit for interactive mode)
    pub query: Option<String>,

    /// Number of results to return
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Drop results scoring below this cosine similarity
    #[arg(long)]
    pub min_similarity: Option<f32>,

    /// Corpus file used to join results
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Archive file to query
    #[arg(long)]
    pub archive: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing search command");

        let archive_path = self.archive.clone().unwrap_or_else(|| config.archive_path());
        let corpus_path = self.corpus.clone().unwrap_or_else(|| config.corpus_path());

        let snapshot = read_archive(&archive_path)?;
        let corpus = Corpus::load(&corpus_path)?;
        let provider = create_provider(&config.embedding)?;

        let options = SearchOptions::new()
            .with_top_k(self.top_k.unwrap_or(config.search.top_k))
            .with_min_similarity(self.min_similarity.unwrap_or(config.search.min_similarity));

        let session = Session {
            provider: provider.as_ref(),
            snapshot: &snapshot,
            corpus: &corpus,
            options,
            json: self.json,
        };

        match &self.query {
            Some(query) => session.run_query(query).await,
            None => session.interactive().await,
        }
    }
}

struct Session<'a> {
    provider: &'a dyn EmbeddingProvider,
    snapshot: &'a Snapshot,
    corpus: &'a Corpus,
    options: SearchOptions,
    json: bool,
}

impl Session<'_> {
    async fn run_query(&self, query: &str) -> AppResult<()> {
        let results = search(self.provider, self.snapshot, self.corpus, query, &self.options).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&results)?);
        } else if results.is_empty() {
            println!("No matching movies found.\n");
        } else {
            for result in &results {
                println!("{}", format_result(result));
            }
        }

        Ok(())
    }

    /// Prompt loop; a failed query is reported and the loop continues.
    async fn interactive(&self) -> AppResult<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("{}", PROMPT);
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let query = line.trim();
            if query.eq_ignore_ascii_case("quit") {
                break;
            }
            if query.is_empty() {
                continue;
            }

            if let Err(e) = self.run_query(query).await {
                eprintln!("Error: {}", e);
            }
        }

        Ok(())
    }
}

/// Human-readable rendering of one hit.
fn format_result(result: &QueryResult) -> String {
    let genres = result
        .record
        .genre_ids
        .iter()
        .map(|g| g.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Title: {}\nGenre IDs: {}\nOverview: {}\nSimilarity Score: {:.4}\n",
        result.record.title.as_deref().unwrap_or("(untitled)"),
        genres,
        result.record.overview.as_deref().unwrap_or(&result.matched_text),
        result.score
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_index::SourceRecord;

    #[test]
    fn test_format_result() {
        let result = QueryResult {
            record: SourceRecord::new(27205)
                .with_title("Inception")
                .with_overview("A thief steals secrets through dreams.")
                .with_genres(vec![28, 878, 12]),
            matched_text: "A thief steals secrets through dreams.".to_string(),
            score: 0.83456,
        };

        assert_eq!(
            format_result(&result),
            "Title: Inception\nGenre IDs: 28, 878, 12\nOverview: A thief steals secrets through dreams.\nSimilarity Score: 0.8346\n"
        );
    }

    #[test]
    fn test_format_result_without_title() {
        let result = QueryResult {
            record: SourceRecord::new(1),
            matched_text: "Matched text".to_string(),
            score: 0.5,
        };

        let text = format_result(&result);
        assert!(text.starts_with("Title: (untitled)\nGenre IDs: \n"));
        assert!(text.contains("Overview: Matched text"));
    }
}
