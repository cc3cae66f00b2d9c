use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "encyclo")]
#[command(about = "Streaming encyclopedia-style definitions from LLM and wiki providers")]
#[command(version)]
pub struct Args {
    /// Topic to define
    pub topic: Option<String>,

    /// Content language (zh or en)
    #[arg(short = 'l', long = "lang", global = true)]
    pub language: Option<String>,

    /// Provider to use for this run (deepseek, gemini, groq, youchat, xunfei)
    #[arg(short = 'p', long, global = true)]
    pub provider: Option<String>,

    /// Category that narrows the definition, e.g. "physics"
    #[arg(short = 'c', long)]
    pub category: Option<String>,

    /// Surrounding text the topic was found in
    #[arg(short = 'x', long)]
    pub context: Option<String>,

    /// Read the surrounding text from a file ("-" for stdin)
    #[arg(long, value_name = "PATH", conflicts_with = "context")]
    pub context_file: Option<String>,

    /// Suppress spinners, hints and status lines
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive reader: look up topics one after another
    Read,
    /// Manage provider API keys
    Keys {
        #[command(subcommand)]
        command: KeysCommand,
    },
    /// List providers or change the selected one
    Providers {
        #[command(subcommand)]
        command: Option<ProvidersCommand>,
    },
    /// List supported language codes
    Languages,
}

#[derive(Subcommand, Debug)]
pub enum KeysCommand {
    /// Store credentials for a provider (prompts when values are omitted)
    Set {
        /// Provider id
        provider: String,

        /// API key
        #[arg(long)]
        key: Option<String>,

        /// API secret (xunfei only)
        #[arg(long)]
        secret: Option<String>,
    },
    /// Remove credentials of one provider, or of all providers
    Clear {
        /// Provider id; omit to clear every stored key
        provider: Option<String>,

        /// Do not ask for confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Show which providers have credentials
    Show,
}

#[derive(Subcommand, Debug)]
pub enum ProvidersCommand {
    /// List providers and their credential status
    List,
    /// Persist the provider used by default
    Select {
        /// Provider id
        provider: String,
    },
    /// Forget the selection and pick the first usable provider again
    Reset,
}
