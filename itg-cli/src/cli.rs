use clap::{Args, Parser, Subcommand};
use itg_collect::SortBy;

#[derive(Debug, Parser)]
#[command(name = "itg")]
#[command(about = "Collect and browse ITG Collect entries from the terminal")]
pub struct Cli {
    /// Use the local in-memory backend instead of the API
    #[arg(long, global = true)]
    pub dev: bool,

    /// Keep state in memory only; nothing is read from or written to disk
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Sign in with email and password
    Login {
        email: String,
    },
    /// Create an account and sign in
    Register {
        name: String,
        email: String,
    },
    /// Remove the stored session and any pending submissions
    Logout,
    /// List entries, filtered and sorted
    List(ListArgs),
    /// Show the most recently added entries
    Recent {
        /// Category to restrict to; "all" shows every category
        #[arg(default_value = "all")]
        category: String,

        /// Ask the backend for its recent list instead of deriving it locally
        #[arg(long)]
        server: bool,
    },
    /// Print one entry as JSON, fetched from the backend
    Show {
        id: String,
    },
    /// Change fields of an existing entry
    Edit(EditArgs),
    /// Count entries within a radius of a point
    Nearby {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lng: f64,
        /// Radius in meters
        #[arg(short, long, default_value_t = 100.0)]
        radius: f64,
    },
    /// Create an entry, or queue it when the backend is unreachable
    Add(AddArgs),
    /// Delete an entry by id
    Delete {
        id: String,
    },
    /// Send queued submissions now
    Sync,
    /// Show queued submissions
    Pending,
    /// Manage locally saved drafts
    #[command(subcommand)]
    Drafts(DraftCommands),
    /// Toggle an entry in your favourites
    Favourite {
        id: String,
    },
    /// Suggest nearby place names for a location
    Suggest {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lng: f64,
        /// Partial name to search for
        #[arg(default_value = "")]
        keyword: String,

        /// Spelling corrections for the keyword instead of nearby places
        #[arg(long)]
        did_you_mean: bool,
    },
    /// Send feedback to the ITG team
    Feedback {
        message: String,
    },
    /// Print config path and create default file if missing
    ConfigPath,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Case-insensitive match against name or description
    #[arg(short, long)]
    pub search: Option<String>,

    /// Only entries you created
    #[arg(long)]
    pub mine: bool,

    #[arg(short, long)]
    pub category: Option<String>,

    /// Only entries created within this many days
    #[arg(long)]
    pub days: Option<u32>,

    /// Require a tag; repeat for several
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// name, distance or date
    #[arg(long, default_value = "distance")]
    pub sort: SortBy,

    /// Reference location as two values: LAT LNG
    #[arg(long, num_args = 2, value_names = ["LAT", "LNG"], allow_negative_numbers = true)]
    pub near: Option<Vec<f64>>,

    /// Only your favourites
    #[arg(long)]
    pub favourites: bool,

    /// Ignore the cache and refetch
    #[arg(long)]
    pub refresh: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    pub name: String,
    #[arg(allow_negative_numbers = true)]
    pub lat: f64,
    #[arg(allow_negative_numbers = true)]
    pub lng: f64,

    #[arg(short, long)]
    pub description: Option<String>,

    /// 1 to 5
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub rating: Option<u8>,

    #[arg(long)]
    pub review: Option<String>,

    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Queue without trying the network
    #[arg(long)]
    pub offline: bool,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    pub id: String,

    #[arg(short, long)]
    pub name: Option<String>,

    #[arg(short, long)]
    pub description: Option<String>,

    /// 1 to 5
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub rating: Option<u8>,

    #[arg(long)]
    pub review: Option<String>,

    /// Replaces the entry's tags; repeat for several
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum DraftCommands {
    /// List saved drafts
    List,
    /// Start a draft at a location
    New {
        name: String,
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lng: f64,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Print one draft as JSON
    Show {
        id: String,
    },
    Delete {
        id: String,
    },
    /// Submit a draft and remove it once created or queued
    Submit {
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_filters() {
        let cli = Cli::try_parse_from([
            "itg", "list", "--search", "cafe", "--tag", "coffee", "--tag", "wifi", "--sort",
            "name", "--near", "51.5", "-0.12",
        ])
        .unwrap();

        let Commands::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.search.as_deref(), Some("cafe"));
        assert_eq!(args.tags, ["coffee", "wifi"]);
        assert_eq!(args.sort, SortBy::Name);
        assert_eq!(args.near, Some(vec![51.5, -0.12]));
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from(["itg", "sync", "--dev", "--ephemeral"]).unwrap();
        assert!(cli.dev);
        assert!(cli.ephemeral);
        assert!(matches!(cli.command, Commands::Sync));
    }

    #[test]
    fn parses_nearby_with_negative_longitude() {
        let cli = Cli::try_parse_from(["itg", "nearby", "51.5", "-0.12", "--radius", "250"]).unwrap();
        let Commands::Nearby { lat, lng, radius } = cli.command else {
            panic!("expected nearby");
        };
        assert_eq!((lat, lng, radius), (51.5, -0.12, 250.0));
    }

    #[test]
    fn parses_edit_overrides() {
        let cli = Cli::try_parse_from(["itg", "edit", "dev-3", "--name", "Museum", "--rating", "4"])
            .unwrap();
        let Commands::Edit(args) = cli.command else {
            panic!("expected edit");
        };
        assert_eq!(args.id, "dev-3");
        assert_eq!(args.name.as_deref(), Some("Museum"));
        assert_eq!(args.rating, Some(4));
        assert!(args.tags.is_empty());
    }

    #[test]
    fn rejects_out_of_range_rating() {
        assert!(Cli::try_parse_from(["itg", "add", "Cafe", "51.5", "-0.12", "--rating", "9"]).is_err());
    }
}
