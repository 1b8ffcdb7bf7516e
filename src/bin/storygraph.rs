//! storygraph CLI: edit a story graph and check it for contradictions.
//!
//! Usage:
//!   storygraph node add <type> [--id ID] [--story STORY] [--prop key=value]...
//!   storygraph edge add <from> <relation> <to> [--prop key=value]...
//!   storygraph validate <story>
//!   storygraph report <story>
//!   storygraph rule add <name> <category> <logic>
//!   storygraph compat <from> <relation> <to>

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use storygraph::{
    CreateNodeRequest, CreateRelationshipRequest, Direction, Envelope, NewRule, NodeFilter, NodeId, NodeType,
    OpenStore, Properties, PropertyValue, SqliteStore, StoryApi, StoryConfig, StoryEngine, ViolationCategory,
    STORY_ID_PROPERTY,
};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "storygraph",
    version,
    about = "Narrative consistency validation for story graphs"
)]
struct Cli {
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to a YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, inspect and list nodes
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Create and remove relationships
    Edge {
        #[command(subcommand)]
        action: EdgeAction,
    },
    /// Validate a story and print the result
    Validate {
        /// Story id
        story: String,
    },
    /// Validate a story and print a summarized report
    Report {
        /// Story id
        story: String,
    },
    /// Manage consistency rules
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },
    /// Check whether a relationship type may connect two node types
    Compat {
        from: String,
        relation: String,
        to: String,
    },
}

#[derive(Subcommand)]
enum NodeAction {
    /// Create a node
    Add {
        /// Node type (Story, Chapter, Scene, Character, Choice, Event, Location, Item)
        node_type: String,
        /// Node id; random when omitted
        #[arg(long)]
        id: Option<String>,
        /// Story the node belongs to
        #[arg(long)]
        story: Option<String>,
        /// Property as key=value; values are read as JSON when they parse
        #[arg(long = "prop", value_name = "KEY=VALUE")]
        props: Vec<String>,
    },
    /// Show a node and its relationships
    Get { id: String },
    /// List nodes
    List {
        #[arg(long = "type")]
        node_type: Option<String>,
        #[arg(long)]
        story: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
enum EdgeAction {
    /// Create a relationship; the compatibility gate decides if it is allowed
    Add {
        from: String,
        relation: String,
        to: String,
        #[arg(long = "prop", value_name = "KEY=VALUE")]
        props: Vec<String>,
    },
    /// Remove a relationship by id
    Remove { id: String },
}

#[derive(Subcommand)]
enum RuleAction {
    /// Register a rule
    Add {
        name: String,
        /// character_behavior, timeline_conflict, state_contradiction or trait_violation
        category: String,
        /// Rule expression, stored as written
        logic: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        disabled: bool,
    },
    /// List rules, newest first
    List {
        #[arg(long)]
        enabled: bool,
    },
    Enable { id: String },
    Disable { id: String },
}

/// Get the default database path (~/.local/share/storygraph/storygraph.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let dir = data_dir.join("storygraph");
    std::fs::create_dir_all(&dir).ok();
    dir.join("storygraph.db")
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<StoryConfig, String> {
    match path {
        Some(path) => StoryConfig::load(path).map_err(|e| e.to_string()),
        None => Ok(StoryConfig::default()),
    }
}

fn open_api(db: Option<PathBuf>, config: &StoryConfig) -> Result<StoryApi, String> {
    let db_path = db
        .or_else(|| config.database.clone())
        .unwrap_or_else(default_db_path);
    let store = Arc::new(
        SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database {}: {}", db_path.display(), e))?,
    );
    let engine = StoryEngine::with_store(store.clone());
    let loaded = engine.load_all().map_err(|e| format!("Failed to load story graph: {}", e))?;
    tracing::info!(path = %db_path.display(), loaded, "opened story graph");
    Ok(StoryApi::with_defaults(Arc::new(engine), store, config))
}

fn parse_props(raw: &[String]) -> Result<Properties, String> {
    let mut props = Properties::new();
    for entry in raw {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| format!("property '{}' is not key=value", entry))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("property '{}' has an empty key", entry));
        }
        let value = serde_json::from_str::<PropertyValue>(value)
            .unwrap_or_else(|_| PropertyValue::String(value.to_string()));
        props.insert(key.to_string(), value);
    }
    Ok(props)
}

/// Print an envelope as JSON; exit status follows `success`
fn emit<T: Serialize>(envelope: &Envelope<T>) -> i32 {
    match serde_json::to_string_pretty(envelope) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("Error: cannot render response: {}", e);
            return 1;
        }
    }
    if envelope.success {
        0
    } else {
        1
    }
}

async fn cmd_node(api: &StoryApi, action: NodeAction) -> i32 {
    match action {
        NodeAction::Add {
            node_type,
            id,
            story,
            props,
        } => {
            let mut properties = match parse_props(&props) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return 1;
                }
            };
            if let Some(story) = story {
                properties.insert(STORY_ID_PROPERTY.to_string(), PropertyValue::String(story));
            }
            emit(
                &api.create_node(CreateNodeRequest {
                    id,
                    node_type,
                    properties,
                })
                .await,
            )
        }
        NodeAction::Get { id } => {
            let code = emit(&api.get_node(&id).await);
            if code == 0 {
                emit(&api.node_relationships(&id, Direction::Both).await);
            }
            code
        }
        NodeAction::List {
            node_type,
            story,
            limit,
        } => {
            let mut filter = NodeFilter::new();
            if let Some(name) = node_type {
                match NodeType::parse(&name) {
                    Some(t) => filter = filter.with_type(t),
                    None => {
                        eprintln!("Error: unknown node type '{}'", name);
                        return 1;
                    }
                }
            }
            if let Some(story) = story {
                filter = filter.in_story(NodeId::from(story.as_str()));
            }
            if let Some(limit) = limit {
                filter = filter.with_limit(limit);
            }
            emit(&api.list_nodes(filter).await)
        }
    }
}

async fn cmd_edge(api: &StoryApi, action: EdgeAction) -> i32 {
    match action {
        EdgeAction::Add {
            from,
            relation,
            to,
            props,
        } => {
            let properties = match parse_props(&props) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return 1;
                }
            };
            emit(
                &api.create_relationship(CreateRelationshipRequest {
                    from,
                    to,
                    relation,
                    properties,
                })
                .await,
            )
        }
        EdgeAction::Remove { id } => emit(&api.delete_relationship(&id).await),
    }
}

fn cmd_rule(api: &StoryApi, action: RuleAction) -> i32 {
    match action {
        RuleAction::Add {
            name,
            category,
            logic,
            description,
            disabled,
        } => {
            let Some(category) = ViolationCategory::parse(&category) else {
                eprintln!("Error: unknown category '{}'", category);
                return 1;
            };
            let mut rule = NewRule::new(name, category, logic).with_description(description);
            if disabled {
                rule = rule.disabled();
            }
            emit(&api.create_rule(rule))
        }
        RuleAction::List { enabled } => emit(&api.list_rules(enabled)),
        RuleAction::Enable { id } => emit(&api.set_rule_enabled(&id, true)),
        RuleAction::Disable { id } => emit(&api.set_rule_enabled(&id, false)),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(cli.config.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Commands::Compat { from, relation, to } = &cli.command {
        let verdict = storygraph::compat::check_names(from, to, relation);
        let code = emit(&Envelope::ok(verdict));
        std::process::exit(code);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let code = rt.block_on(async {
        let api = match open_api(cli.db, &config) {
            Ok(api) => api,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        };
        let code = match cli.command {
            Commands::Node { action } => cmd_node(&api, action).await,
            Commands::Edge { action } => cmd_edge(&api, action).await,
            Commands::Validate { story } => emit(&api.validate(&story).await),
            Commands::Report { story } => emit(&api.report(&story).await),
            Commands::Rule { action } => cmd_rule(&api, action),
            Commands::Compat { .. } => 0,
        };
        api.cache().flush().await;
        code
    });
    std::process::exit(code);
}
