//! ls command - List the objects in a bucket on either endpoint

use clap::{Args, ValueEnum};
use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_BORDERS_ONLY};
use futures::TryStreamExt;
use serde::Serialize;
use shift_core::{ObjectDescriptor, is_document, list_objects};
use shift_s3::S3Client;

use super::ConfigSource;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Which configured endpoint to list
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Source,
    Destination,
}

/// List objects in a bucket
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Bucket to list (defaults to the configured source bucket)
    pub bucket: Option<String>,

    /// Endpoint the bucket lives on
    #[arg(long, value_enum, default_value = "source")]
    pub endpoint: Endpoint,

    /// Only list documents (.pdf, .txt, .doc, .docx)
    #[arg(short, long)]
    pub documents: bool,

    /// Print totals only
    #[arg(short, long)]
    pub summarize: bool,
}

#[derive(Debug, Serialize)]
struct LsOutput {
    bucket: String,
    objects: Vec<ObjectDescriptor>,
    total_objects: usize,
    total_size_bytes: u64,
    total_size_human: String,
}

/// Execute the ls command
pub async fn execute(
    args: LsArgs,
    source: &ConfigSource,
    output_config: OutputConfig,
) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let config = match source.load() {
        Ok(c) => c,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::from_anyhow(&e);
        }
    };

    let (endpoint, name) = match args.endpoint {
        Endpoint::Source => (&config.source, "source"),
        Endpoint::Destination => (&config.destination, "destination"),
    };
    let validated = match args.endpoint {
        Endpoint::Source => endpoint.validate(name),
        Endpoint::Destination => endpoint.validate_with_default_chain(name),
    };
    if let Err(e) = validated {
        formatter.error(&e.to_string());
        return ExitCode::from_error(&e);
    }

    let bucket = match args.bucket.clone().or_else(|| match args.endpoint {
        Endpoint::Source => config.migration.source_buckets.first().cloned(),
        Endpoint::Destination => config.migration.default_bucket.clone(),
    }) {
        Some(b) => b,
        None => {
            formatter.error("No bucket given and none configured for this endpoint");
            return ExitCode::UsageError;
        }
    };

    let client = match S3Client::new(endpoint, config.retry.clone()).await {
        Ok(c) => c,
        Err(e) => {
            formatter.error(&format!("Failed to create S3 client: {e}"));
            return ExitCode::from_error(&e);
        }
    };

    let objects: Vec<ObjectDescriptor> = match list_objects(&client, &bucket)
        .try_filter(|o| std::future::ready(!args.documents || is_document(&o.key)))
        .try_collect()
        .await
    {
        Ok(objects) => objects,
        Err(e) => {
            formatter.error(&format!("Failed to list {bucket}: {e}"));
            return ExitCode::from_error(&e);
        }
    };

    let total_size_bytes: u64 = objects.iter().map(|o| o.size).sum();
    let total_size_human = humansize::format_size(total_size_bytes, humansize::BINARY);

    if formatter.is_json() {
        formatter.json(&LsOutput {
            bucket,
            total_objects: objects.len(),
            total_size_bytes,
            total_size_human,
            objects: if args.summarize { Vec::new() } else { objects },
        });
        return ExitCode::Success;
    }

    if !args.summarize && !objects.is_empty() {
        formatter.println(&render_table(&objects).to_string());
    }
    formatter.println(&format!(
        "{}: {} object(s), {}",
        formatter.style_name(&bucket),
        objects.len(),
        formatter.style_size(&total_size_human)
    ));

    ExitCode::Success
}

fn render_table(objects: &[ObjectDescriptor]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Key", "Size", "Last modified"]);

    for object in objects {
        let modified = object
            .last_modified
            .map(|t| t.strftime("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(&object.key),
            Cell::new(humansize::format_size(object.size, humansize::BINARY))
                .set_alignment(CellAlignment::Right),
            Cell::new(modified),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_table() {
        let mut object = ObjectDescriptor::new("documents/a.pdf", 2048);
        object.last_modified = Some("2024-03-05T14:07:09Z".parse().unwrap());

        let text = render_table(&[object]).to_string();
        assert!(text.contains("documents/a.pdf"));
        assert!(text.contains("2 KiB"));
        assert!(text.contains("2024-03-05 14:07:09"));
    }
}
