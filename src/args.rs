use clap::Parser;

/// Generates the consolidated critique report from a raw LMS export.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The critique export downloaded from the LMS. The legacy (.xls) and
    /// modern (.xlsx) formats are both supported and told apart by extension.
    #[clap(short, long, value_parser)]
    pub input: String,

    /// (file path) Where the generated report document will be written. The report only
    /// appears at this location once it has been fully written.
    #[clap(short, long, value_parser)]
    pub out: String,

    /// (file path, 'stdout' or empty) If specified, a machine-readable summary of the
    /// cleaned dataset will be written in JSON format to the given location.
    #[clap(short, long, value_parser)]
    pub summary: Option<String>,

    /// (default: first worksheet) When the export holds several worksheets, indicates the
    /// name of the worksheet containing the responses.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,

    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
