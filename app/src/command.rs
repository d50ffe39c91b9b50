use clap::Subcommand;
use error::{StoreError, StoreResult};
use serde_json::json;
use store::DocumentManager;
use util::{Filter, ListParams, SortField, ViewSpec, DEFAULT_PAGE_SIZE};
use value::Document;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create missing collections and unique indexes
    Init,

    /// Report the state of the configured backend
    Health,

    /// List documents of an entity
    List {
        entity: String,

        /// Conditions as `field=value` or `field=op:value` with op one of eq, gt, gte, lt, lte
        filters: Vec<String>,

        /// Comma separated fields, `-field` or `field:desc` sorts descending
        #[arg(short, long)]
        sort: Option<String>,

        #[arg(short, long, default_value_t = 1)]
        page: u64,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        size: u64,

        /// Expanded references, `user:firstName,lastName;org:name`
        #[arg(short, long)]
        view: Option<String>,

        /// Match free text filters as whole values
        #[arg(long)]
        exact: bool,
    },

    /// Show one document
    Get {
        entity: String,
        id: String,

        #[arg(short, long)]
        view: Option<String>,
    },

    /// Create a document from a JSON object
    Create { entity: String, json: String },

    /// Merge a JSON object into a stored document
    Update {
        entity: String,
        id: String,
        json: String,
    },

    /// Remove a document, removing a missing one is not an error
    Delete { entity: String, id: String },
}

fn parse_filters(raw: &[String]) -> StoreResult<Filter> {
    let pairs = raw
        .iter()
        .map(|condition| {
            condition
                .split_once('=')
                .ok_or_else(|| StoreError::invalid(format!("expected field=value, got '{}'", condition)))
        })
        .collect::<StoreResult<Vec<_>>>()?;
    Filter::parse_tokens(&pairs)
}

fn parse_view(raw: Option<&str>) -> StoreResult<ViewSpec> {
    raw.map(ViewSpec::parse).unwrap_or_else(|| Ok(ViewSpec::new()))
}

fn parse_document(raw: &str) -> StoreResult<Document> {
    Document::parse_json(raw).map_err(StoreError::invalid)
}

fn documents(documents: &[Document]) -> serde_json::Value {
    serde_json::Value::Array(documents.iter().map(|d| d.to_json()).collect())
}

/// Runs one command, the result is printed as JSON.
pub async fn run(manager: &DocumentManager, command: Command) -> StoreResult<serde_json::Value> {
    Ok(match command {
        Command::Init => {
            manager.init().await?;
            json!({"initialized": true})
        }
        Command::Health => json!({"status": manager.health().await.to_string()}),
        Command::List {
            entity,
            filters,
            sort,
            page,
            size,
            view,
            exact,
        } => {
            let mut params = ListParams::new()
                .page(page, size)
                .filter(parse_filters(&filters)?)
                .view(parse_view(view.as_deref())?);
            if let Some(sort) = sort {
                params = params.sort(SortField::parse_list(&sort)?);
            }
            if exact {
                params = params.exact();
            }
            let outcome = manager.list(&entity, &params).await?;
            json!({
                "documents": documents(&outcome.documents),
                "total": outcome.total,
                "page": page,
                "pages": util::pagination::page_count(outcome.total, size),
            })
        }
        Command::Get { entity, id, view } => {
            let outcome = manager
                .get_by_id(&entity, &id, &parse_view(view.as_deref())?, true)
                .await?;
            outcome
                .document
                .map(|d| d.to_json())
                .unwrap_or(serde_json::Value::Null)
        }
        Command::Create { entity, json } => {
            let outcome = manager.create(&entity, parse_document(&json)?).await?;
            outcome.document.to_json()
        }
        Command::Update { entity, id, json } => {
            let outcome = manager.update(&entity, &id, parse_document(&json)?).await?;
            outcome.document.to_json()
        }
        Command::Delete { entity, id } => {
            let outcome = manager.delete(&entity, &id).await?;
            json!({"deleted": outcome.count})
        }
    })
}
