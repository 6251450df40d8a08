use std::io;
use std::path::Path;
use tokio::fs::{File, OpenOptions};

/// What to do when the export file already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingFilePolicy {
    /// Truncate and rewrite the file
    #[default]
    Overwrite,
    /// Refuse to touch the file
    Fail,
}

/// Record terminator for the exported CSV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineTerminator {
    #[default]
    Lf,
    CrLf,
}

/// CSV encoding settings for the exported file
#[derive(Debug, Clone)]
pub struct DelimitedConfig {
    pub delimiter: u8,
    pub quote: u8,
    pub terminator: LineTerminator,
}

impl Default for DelimitedConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            terminator: LineTerminator::Lf,
        }
    }
}

impl DelimitedConfig {
    pub fn with_terminator(terminator: LineTerminator) -> Self {
        Self {
            terminator,
            ..Self::default()
        }
    }

    /// Encode records into CSV bytes.
    ///
    /// Fields are quoted only when they contain the delimiter, the quote
    /// character or a line break; quotes inside a field are doubled. Encoding
    /// the same records one at a time or all at once yields the same bytes.
    pub fn encode<I, R, F>(&self, records: I) -> io::Result<Vec<u8>>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = F>,
        F: AsRef<[u8]>,
    {
        let terminator = match self.terminator {
            LineTerminator::Lf => csv::Terminator::Any(b'\n'),
            LineTerminator::CrLf => csv::Terminator::CRLF,
        };

        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote(self.quote)
            .double_quote(true)
            .quote_style(csv::QuoteStyle::Necessary)
            .terminator(terminator)
            .has_headers(false)
            .from_writer(Vec::new());

        for record in records {
            writer.write_record(record)?;
        }

        writer.into_inner().map_err(|e| e.into_error())
    }
}

/// Open the export file for writing, creating missing parent directories.
pub async fn open_export_file(path: &Path, policy: ExistingFilePolicy) -> io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut options = OpenOptions::new();
    options.write(true);
    match policy {
        ExistingFilePolicy::Overwrite => options.create(true).truncate(true),
        ExistingFilePolicy::Fail => options.create_new(true),
    };

    options.open(path).await
}
