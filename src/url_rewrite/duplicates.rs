//! Detection and resolution of `(request_path, store_id)` collisions.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::resource::Source;
use crate::url_rewrite::model::{EntityType, ResolutionKey, RewriteRow, StagingRow};
use crate::url_rewrite::staging::STAGING_TABLE;
use crate::AppResult;

static EXTENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*)\.([^.]+)$").expect("extension pattern to compile")
});

/// Every staging row whose `(request_path, store_id)` occurs more than once,
/// ordered by store, path, then priority. Equal priorities keep staging order.
pub fn find_duplicates(source: &Source) -> AppResult<Vec<StagingRow>> {
    let staging = source.ident(STAGING_TABLE);
    let sql = format!(
        "SELECT t.* FROM {staging} t
         JOIN (SELECT request_path, store_id FROM {staging}
               GROUP BY request_path, store_id HAVING COUNT(*) > 1) d
           ON d.request_path = t.request_path AND d.store_id = t.store_id
         ORDER BY t.store_id, t.request_path, t.priority, t.id"
    );
    source
        .query_records(&sql)?
        .iter()
        .map(StagingRow::from_record)
        .collect()
}

/// Insert `-<token>` before the last extension, or append it when the path
/// has none.
pub fn splice_token(path: &str, token: &str) -> String {
    match EXTENSION.captures(path) {
        Some(caps) => format!("{}-{token}.{}", &caps[1], &caps[2]),
        None => format!("{path}-{token}"),
    }
}

pub fn random_token() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DuplicateEntry {
    id: Option<i64>,
    store_id: i64,
    used: bool,
}

/// Duplicate rows grouped by request path, in detector order.
#[derive(Debug, Clone, Default)]
pub struct DuplicateIndex {
    by_path: HashMap<String, Vec<DuplicateEntry>>,
}

impl DuplicateIndex {
    pub fn from_rows(rows: &[StagingRow]) -> Self {
        let mut by_path: HashMap<String, Vec<DuplicateEntry>> = HashMap::new();
        for row in rows {
            by_path
                .entry(row.request_path.clone())
                .or_default()
                .push(DuplicateEntry {
                    id: row.id,
                    store_id: row.store_id,
                    used: false,
                });
        }
        Self { by_path }
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Number of distinct `(request_path, store_id)` groups.
    pub fn group_count(&self) -> usize {
        self.by_path
            .values()
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| entry.store_id)
                    .collect::<HashSet<_>>()
                    .len()
            })
            .sum()
    }

    /// Register one occurrence of `request_path` on `store_id` and report
    /// whether it keeps the path.
    ///
    /// A row the detector saw (matched by staging id) wins only if it is the
    /// first entry for its store, so the lowest priority keeps the path no
    /// matter which page it arrives on. Rows without a known id fall back to
    /// first come, first served.
    pub fn claim(&mut self, request_path: &str, store_id: i64, id: Option<i64>) -> bool {
        let Some(entries) = self.by_path.get_mut(request_path) else {
            return true;
        };
        let winner = entries.iter().position(|entry| entry.store_id == store_id);
        if let Some(id) = id {
            if let Some(own) = entries
                .iter()
                .position(|entry| entry.store_id == store_id && entry.id == Some(id))
            {
                entries[own].used = true;
                return winner == Some(own);
            }
        }
        match entries
            .iter_mut()
            .find(|entry| entry.store_id == store_id && !entry.used)
        {
            Some(entry) => {
                entry.used = true;
                true
            }
            None => winner.is_none(),
        }
    }
}

/// Resolution tokens keyed by destination entity and store. The first token
/// recorded for a key is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionRecord {
    tokens: BTreeMap<ResolutionKey, String>,
}

impl ResolutionRecord {
    pub fn insert(&mut self, key: ResolutionKey, token: impl Into<String>) -> bool {
        if self.tokens.contains_key(&key) {
            return false;
        }
        self.tokens.insert(key, token.into());
        true
    }

    pub fn get(&self, key: &ResolutionKey) -> Option<&str> {
        self.tokens.get(key).map(String::as_str)
    }

    /// `(store_id, token)` pairs recorded for one entity, by ascending store.
    pub fn stores_for(
        &self,
        entity_type: EntityType,
        entity_id: i64,
    ) -> impl Iterator<Item = (i64, &str)> + '_ {
        let start = ResolutionKey::new(entity_type, entity_id, i64::MIN);
        let end = ResolutionKey::new(entity_type, entity_id, i64::MAX);
        self.tokens
            .range(start..=end)
            .map(|(key, token)| (key.store_id, token.as_str()))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

pub type TokenSource = Box<dyn FnMut() -> String>;

/// Audit line emitted for every renamed row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDuplicate {
    pub request_path: String,
    pub target_path: String,
    pub store_id: i64,
    pub new_request_path: String,
}

impl fmt::Display for ResolvedDuplicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Duplicate resolved. Request path was: {} Target path was: {} Store ID: {} New request path: {}",
            self.request_path, self.target_path, self.store_id, self.new_request_path
        )
    }
}

/// Decides per row whether its request path must be renamed.
pub struct DuplicateResolver {
    index: DuplicateIndex,
    resolutions: ResolutionRecord,
    resolved: Vec<ResolvedDuplicate>,
    next_token: TokenSource,
}

impl fmt::Debug for DuplicateResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplicateResolver")
            .field("index", &self.index)
            .field("resolutions", &self.resolutions)
            .field("resolved", &self.resolved.len())
            .finish()
    }
}

impl DuplicateResolver {
    pub fn new(index: DuplicateIndex) -> Self {
        Self::with_tokens(index, Box::new(random_token))
    }

    pub fn with_tokens(index: DuplicateIndex, next_token: TokenSource) -> Self {
        Self {
            index,
            resolutions: ResolutionRecord::default(),
            resolved: Vec::new(),
            next_token,
        }
    }

    /// A resolver that never renames anything.
    pub fn disabled() -> Self {
        Self::new(DuplicateIndex::default())
    }

    /// Look up the staging request path and, when this occurrence loses, rename
    /// `rewrite.request_path` and record the token under the destination
    /// entity of `rewrite` and the staging store.
    pub fn resolve(&mut self, staging: &StagingRow, rewrite: &mut RewriteRow) -> bool {
        if self
            .index
            .claim(&staging.request_path, staging.store_id, staging.id)
        {
            return false;
        }
        let token = (self.next_token)();
        let new_path = splice_token(&staging.request_path, &token);
        self.resolutions.insert(
            ResolutionKey::new(rewrite.entity_type, rewrite.entity_id, staging.store_id),
            token,
        );
        self.resolved.push(ResolvedDuplicate {
            request_path: staging.request_path.clone(),
            target_path: staging.target_path.clone(),
            store_id: staging.store_id,
            new_request_path: new_path.clone(),
        });
        rewrite.request_path = new_path;
        true
    }

    pub fn resolutions(&self) -> &ResolutionRecord {
        &self.resolutions
    }

    pub fn resolved(&self) -> &[ResolvedDuplicate] {
        &self.resolved
    }

    pub fn into_parts(self) -> (ResolutionRecord, Vec<ResolvedDuplicate>) {
        (self.resolutions, self.resolved)
    }
}
