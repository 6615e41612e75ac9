//! Full-text search over active listings.
//!
//! Only `active` listings live in the index. A buyer's query is matched
//! against make/model, title, city, fuel type and description, each with its
//! own boost; every term must match somewhere in the listing. City and
//! dealer filters are exact terms ANDed into the query, so paging counts
//! only listings that pass them.

use std::path::Path;

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, ConstScoreQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value, STORED, STRING, TEXT};
use tantivy::{
    doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, TantivyError, Term,
};
use tokio::sync::Mutex;

use crate::errors::AppError;
use crate::models::{Listing, ListingStatus};

const WRITER_MEMORY_BYTES: usize = 50_000_000;

/// A matching listing id and its relevance.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub listing_id: String,
    pub score: f32,
}

/// Exact-match restrictions applied inside the index query.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchFilter<'a> {
    /// Matched case-insensitively.
    pub city: Option<&'a str>,
    pub dealer_id: Option<&'a str>,
}

fn city_key(city: &str) -> String {
    city.trim().to_lowercase()
}

struct ListingFields {
    id: Field,
    make_model: Field,
    title: Field,
    city: Field,
    fuel_type: Field,
    description: Field,
    city_key: Field,
    dealer_id: Field,
}

impl ListingFields {
    fn schema() -> (Schema, Self) {
        let mut builder = Schema::builder();
        let fields = Self {
            id: builder.add_text_field("listing_id", STRING | STORED),
            make_model: builder.add_text_field("make_model", TEXT),
            title: builder.add_text_field("title", TEXT),
            city: builder.add_text_field("city", TEXT),
            fuel_type: builder.add_text_field("fuel_type", TEXT),
            description: builder.add_text_field("description", TEXT),
            city_key: builder.add_text_field("city_key", STRING),
            dealer_id: builder.add_text_field("dealer_id", STRING),
        };
        (builder.build(), fields)
    }

    /// Searchable fields with their boosts; what a buyer types first
    /// (make and model) weighs most.
    fn boosted(&self) -> [(Field, f32); 5] {
        [
            (self.make_model, 10.0),
            (self.title, 8.0),
            (self.city, 5.0),
            (self.fuel_type, 3.0),
            (self.description, 2.0),
        ]
    }

    fn document(&self, listing: &Listing) -> TantivyDocument {
        doc!(
            self.id => listing.id.as_str(),
            self.make_model => format!("{} {} {}", listing.make, listing.model, listing.year),
            self.title => listing.title.as_str(),
            self.city => listing.city.as_deref().unwrap_or_default(),
            self.fuel_type => listing.fuel_type.as_deref().unwrap_or_default(),
            self.description => listing.description.as_deref().unwrap_or_default(),
            self.city_key => city_key(listing.city.as_deref().unwrap_or_default()),
            self.dealer_id => listing.dealer_id.as_str()
        )
    }
}

/// Listing index backed by a Tantivy directory on disk.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: ListingFields,
}

impl SearchIndex {
    /// Open the index at `index_path`, creating it when absent.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)?;

        let (schema, fields) = ListingFields::schema();
        let directory = MmapDirectory::open(index_path)
            .map_err(|e| AppError::Search(format!("Cannot open index directory: {}", e)))?;
        // The index is rebuilt from the database at startup, so an index
        // written with an older schema is simply recreated.
        let index = match Index::open_or_create(directory, schema.clone()) {
            Err(TantivyError::SchemaError(reason)) => {
                tracing::warn!(%reason, "Listing index schema changed, recreating");
                std::fs::remove_dir_all(index_path)?;
                std::fs::create_dir_all(index_path)?;
                Index::create_in_dir(index_path, schema)?
            }
            opened => opened?,
        };

        // Reloaded explicitly after each commit
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer(WRITER_MEMORY_BYTES)?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
        })
    }

    /// Replace the index contents with the active listings in `listings`.
    pub async fn rebuild(&self, listings: &[Listing]) -> Result<(), AppError> {
        let mut writer = self.writer.lock().await;
        writer.delete_all_documents()?;

        let mut indexed = 0usize;
        for listing in listings {
            if listing.status == ListingStatus::Active {
                writer.add_document(self.fields.document(listing))?;
                indexed += 1;
            }
        }

        writer.commit()?;
        self.reader.reload()?;

        tracing::info!(listings = indexed, "Listing index rebuilt");
        Ok(())
    }

    /// Upsert one listing. A listing that is no longer active is removed.
    pub async fn index_listing(&self, listing: &Listing) -> Result<(), AppError> {
        let mut writer = self.writer.lock().await;
        writer.delete_term(Term::from_field_text(self.fields.id, &listing.id));
        if listing.status == ListingStatus::Active {
            writer.add_document(self.fields.document(listing))?;
        }
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Ranked listing ids for a free-text query, restricted by `filter`.
    /// Syntax errors in the query are tolerated; a blank query matches nothing.
    pub fn search(
        &self,
        query: &str,
        filter: &SearchFilter<'_>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, AppError> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let boosted = self.fields.boosted();
        let mut parser =
            QueryParser::for_index(&self.index, boosted.iter().map(|(field, _)| *field).collect());
        for (field, boost) in boosted {
            parser.set_field_boost(field, boost);
        }
        parser.set_conjunction_by_default();

        let (parsed, errors) = parser.parse_query_lenient(query);
        if !errors.is_empty() {
            tracing::debug!(query, errors = errors.len(), "Parsed search query leniently");
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, parsed)];
        let exact = [
            (self.fields.city_key, filter.city.map(city_key)),
            (self.fields.dealer_id, filter.dealer_id.map(str::to_string)),
        ];
        for (field, value) in exact {
            if let Some(value) = value {
                let term = TermQuery::new(
                    Term::from_field_text(field, &value),
                    IndexRecordOption::Basic,
                );
                // Filters narrow the hits without touching relevance
                let restriction = ConstScoreQuery::new(Box::new(term), 0.0);
                clauses.push((Occur::Must, Box::new(restriction)));
            }
        }
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let hits = searcher.search(&query, &TopDocs::with_limit(limit).and_offset(offset))?;

        let mut results = Vec::with_capacity(hits.len());
        for (score, address) in hits {
            let stored: TantivyDocument = searcher.doc(address)?;
            if let Some(id) = stored.get_first(self.fields.id).and_then(|v| v.as_str()) {
                results.push(SearchResult {
                    listing_id: id.to_string(),
                    score,
                });
            }
        }
        Ok(results)
    }
}
