use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use wedwire_common::{ListFilter, ListOrder, ListQuery};

/// Wedding-news ingestion and article store.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// YAML config file. Without it, `wedwire.yaml` is read when present.
    #[arg(short, long, env = "WEDWIRE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Search, enrich and store one batch; prints the articles that have an image.
    Ingest,
    /// Print one page of stored articles.
    List {
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
        /// Case-insensitive title substring.
        #[arg(short, long)]
        query: Option<String>,
        #[arg(long, value_enum, default_value_t = Order::Recent)]
        order: Order,
        #[arg(long)]
        include_archived: bool,
        /// Only articles with a resolved image.
        #[arg(long)]
        has_image: bool,
    },
    /// Print one article, backfilling its content if it is missing.
    Show { link: String },
    /// Hide an article from listings, or bring it back with `--restore`.
    Archive {
        link: String,
        #[arg(long)]
        restore: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Recent,
    ImageFirst,
}

impl From<Order> for ListOrder {
    fn from(o: Order) -> Self {
        match o {
            Order::Recent => ListOrder::Recent,
            Order::ImageFirst => ListOrder::ImageFirst,
        }
    }
}

impl Command {
    /// The store query for a `list` invocation.
    pub fn list_query(&self) -> Option<ListQuery> {
        let Command::List {
            offset,
            limit,
            query,
            order,
            include_archived,
            has_image,
        } = self
        else {
            return None;
        };
        Some(ListQuery {
            offset: *offset,
            limit: *limit,
            order: (*order).into(),
            filter: ListFilter {
                title_contains: query.clone(),
                include_archived: *include_archived,
                has_image_only: *has_image,
            },
        })
    }
}
