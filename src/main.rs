use clap::{Parser, Subcommand};
use std::path::PathBuf;
use video_search::Result;
use video_search::commands::{
    compact_store, index_videos, list_videos, remove_video, search_videos, show_status,
};
use video_search::config::{Config, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "video-search")]
#[command(about = "Index videos by what they show and search them with natural language")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the model server, frame sampling and storage
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Caption, summarize and store one or more videos
    Index {
        /// Video files to index
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Seconds of video between two captioned frames
        #[arg(long)]
        interval: Option<f64>,
    },
    /// Find the indexed videos that best match a description
    Search {
        /// What the video shows, e.g. "a cat sleeping on a couch"
        query: String,
        /// Maximum number of results
        #[arg(long, short = 'k')]
        limit: Option<usize>,
    },
    /// List all indexed videos
    List,
    /// Remove a video from the index
    Remove {
        /// Path the video was indexed under
        path: PathBuf,
    },
    /// Show store, decoder and model status
    Status,
    /// Compact the vector store
    Compact,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Index { paths, interval } => {
            index_videos(&Config::load_default()?, &paths, interval).await?;
        }
        Commands::Search { query, limit } => {
            search_videos(&Config::load_default()?, &query, limit).await?;
        }
        Commands::List => {
            list_videos(&Config::load_default()?).await?;
        }
        Commands::Remove { path } => {
            remove_video(&Config::load_default()?, &path).await?;
        }
        Commands::Status => {
            show_status(&Config::load_default()?).await?;
        }
        Commands::Compact => {
            compact_store(&Config::load_default()?).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["video-search", "list"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::List));
        }
    }

    #[test]
    fn index_command_with_paths() {
        let cli = Cli::try_parse_from([
            "video-search",
            "index",
            "storage/cat.mp4",
            "storage/dog.mp4",
            "--interval",
            "0.5",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Index { paths, interval } = parsed.command {
                assert_eq!(
                    paths,
                    vec![
                        PathBuf::from("storage/cat.mp4"),
                        PathBuf::from("storage/dog.mp4")
                    ]
                );
                assert_eq!(interval, Some(0.5));
            } else {
                panic!("expected index command");
            }
        }
    }

    #[test]
    fn index_command_requires_a_path() {
        let cli = Cli::try_parse_from(["video-search", "index"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn search_command_with_limit() {
        let cli = Cli::try_parse_from(["video-search", "search", "a cat", "-k", "5"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search { query, limit } = parsed.command {
                assert_eq!(query, "a cat");
                assert_eq!(limit, Some(5));
            } else {
                panic!("expected search command");
            }
        }
    }

    #[test]
    fn search_command_defaults_limit() {
        let cli = Cli::try_parse_from(["video-search", "search", "a dog"]);

        if let Ok(parsed) = cli {
            if let Commands::Search { limit, .. } = parsed.command {
                assert_eq!(limit, None);
            }
        } else {
            panic!("search without limit should parse");
        }
    }

    #[test]
    fn remove_command() {
        let cli = Cli::try_parse_from(["video-search", "remove", "storage/cat.mp4"]);

        if let Ok(parsed) = cli {
            if let Commands::Remove { path } = parsed.command {
                assert_eq!(path, PathBuf::from("storage/cat.mp4"));
            }
        } else {
            panic!("remove should parse");
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["video-search", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["video-search", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["video-search", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
