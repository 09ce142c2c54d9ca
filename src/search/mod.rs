use std::cmp::Ordering;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use tokio::sync::RwLock;

use crate::types::{
    CatalogQuery, Project, ProjectFilters, ProjectPage, SearchHit, SortDir, SortKey,
};

/// In-memory query structure over the catalog. The snapshot is replaced
/// wholesale on every rebuild; catalogs are bounded by local filesystem
/// project counts, so O(n) rebuild-on-write is fine. The handle is cheap to
/// clone and shares one snapshot.
#[derive(Clone)]
pub struct SearchIndex {
    inner: std::sync::Arc<IndexInner>,
}

struct IndexInner {
    similarity_threshold: f32,
    min_query_len: usize,
    snapshot: RwLock<Vec<Project>>,
}

impl SearchIndex {
    pub fn new(similarity_threshold: f32, min_query_len: usize) -> Self {
        Self {
            inner: std::sync::Arc::new(IndexInner {
                similarity_threshold,
                min_query_len: min_query_len.max(1),
                snapshot: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Replaces the whole snapshot.
    pub async fn build_index(&self, projects: Vec<Project>) {
        *self.inner.snapshot.write().await = projects;
    }

    pub async fn len(&self) -> usize {
        self.inner.snapshot.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.snapshot.read().await.is_empty()
    }

    /// Convenience single-record insert. Internally a full rebuild — callers
    /// doing bulk mutations should batch and call `build_index` once.
    pub async fn add_project(&self, project: Project) {
        let mut next = self.inner.snapshot.read().await.clone();
        next.retain(|p| p.id != project.id);
        next.push(project);
        self.build_index(next).await;
    }

    pub async fn update_project(&self, project: Project) {
        self.add_project(project).await;
    }

    pub async fn remove_project(&self, id: &str) {
        let mut next = self.inner.snapshot.read().await.clone();
        next.retain(|p| p.id != id);
        self.build_index(next).await;
    }

    /// Approximate text search, weighted across name, tags, path and
    /// description (name heaviest). Results are ranked best-first.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let query = query.trim().to_lowercase();
        if query.chars().count() < self.inner.min_query_len {
            return Vec::new();
        }
        let matcher = SkimMatcherV2::default().ignore_case();
        let snap = self.inner.snapshot.read().await;
        let mut hits: Vec<SearchHit> = snap
            .iter()
            .filter_map(|p| {
                self.score_project(&matcher, p, &query)
                    .map(|score| SearchHit { project: p.clone(), score })
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(limit.max(1));
        hits
    }

    /// Exact filters, stable comparator sort, offset/limit pagination.
    /// Returns the page plus the total filtered count.
    pub async fn get_all(&self, query: &CatalogQuery) -> ProjectPage {
        let snap = self.inner.snapshot.read().await;
        let mut items: Vec<&Project> =
            snap.iter().filter(|p| matches_filters(p, &query.filters)).collect();
        items.sort_by(|a, b| compare_projects(a, b, query.sort, query.dir));
        let total = items.len();

        // Clamp to keep resource usage bounded even with absurd page numbers
        let page = query.page.clamp(1, 1_000_000);
        let items = if query.page_size == 0 {
            items.into_iter().map(|p| p.clone()).collect()
        } else {
            items
                .into_iter()
                .skip((page - 1).saturating_mul(query.page_size))
                .take(query.page_size)
                .map(|p| p.clone())
                .collect()
        };
        ProjectPage { items, total }
    }

    fn score_project(&self, matcher: &SkimMatcherV2, project: &Project, query: &str) -> Option<f32> {
        let mut best: f32 = 0.0;
        let mut consider = |text: &str, weight: f32| {
            let sim = self.similarity(matcher, text, query);
            if sim >= self.inner.similarity_threshold {
                best = best.max(sim * weight);
            }
        };

        consider(&project.name, 3.0);
        for tag in &project.tags {
            consider(tag, 2.0);
        }
        if let Some(stem) = project.path.rsplit('/').next() {
            consider(stem, 1.5);
        }
        if let Some(desc) = &project.description {
            consider(desc, 1.0);
        }
        consider(&project.path, 1.0);

        (best > 0.0).then_some(best)
    }

    /// Similarity in 0.0..=1.0 combining exact/substring containment, a
    /// subsequence match and Levenshtein distance over single words. The
    /// Levenshtein leg is what tolerates transposed characters.
    fn similarity(&self, matcher: &SkimMatcherV2, text: &str, query: &str) -> f32 {
        let text = text.to_lowercase();
        if text == query {
            return 1.0;
        }
        if text.contains(query) {
            return 0.9;
        }

        let mut sim: f32 = 0.0;
        if let Some(score) = matcher.fuzzy_match(&text, query) {
            let self_score = matcher.fuzzy_match(query, query).unwrap_or(1).max(1);
            sim = (score as f32 / self_score as f32).clamp(0.0, 1.0) * 0.9;
        }
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let max_len = word.chars().count().max(query.chars().count());
            if max_len == 0 {
                continue;
            }
            let dist = levenshtein::levenshtein(word, query);
            let word_sim = 1.0 - dist as f32 / max_len as f32;
            sim = sim.max(word_sim);
        }
        sim
    }
}

fn matches_filters(project: &Project, filters: &ProjectFilters) -> bool {
    if let Some(kind) = filters.kind {
        if project.kind != kind {
            return false;
        }
    }
    if let Some(provider) = &filters.provider {
        if project.provider.as_deref() != Some(provider.as_str()) {
            return false;
        }
    }
    if let Some(tags) = &filters.tags {
        // Any-of: mindestens ein gesuchter Tag muss vorhanden sein
        if !tags.iter().any(|t| project.tags.iter().any(|pt| pt == t)) {
            return false;
        }
    }
    if let Some(importance) = filters.importance {
        if project.importance != importance {
            return false;
        }
    }
    true
}

/// Stable comparator: strings compare case-insensitively, numeric and date
/// fields numerically, and missing values sort last regardless of direction.
fn compare_projects(a: &Project, b: &Project, key: SortKey, dir: SortDir) -> Ordering {
    let ord = match key {
        SortKey::Name => cmp_str(&a.name, &b.name, dir),
        SortKey::Path => cmp_str(&a.path, &b.path, dir),
        SortKey::SizeBytes => cmp_num(a.size_bytes, b.size_bytes, dir),
        SortKey::Importance => cmp_num(a.importance as u64, b.importance as u64, dir),
        SortKey::FileCount => cmp_num(a.file_count, b.file_count, dir),
        SortKey::CreatedAt => cmp_opt_date(&a.created_at, &b.created_at, dir),
        SortKey::ModifiedAt => cmp_opt_date(&a.modified_at, &b.modified_at, dir),
        SortKey::LastScannedAt => cmp_opt_date(&a.last_scanned_at, &b.last_scanned_at, dir),
    };
    // Deterministic tie-break on the surrogate key
    ord.then_with(|| a.id.cmp(&b.id))
}

fn cmp_str(a: &str, b: &str, dir: SortDir) -> Ordering {
    let ord = a.to_lowercase().cmp(&b.to_lowercase());
    apply_dir(ord, dir)
}

fn cmp_num(a: u64, b: u64, dir: SortDir) -> Ordering {
    apply_dir(a.cmp(&b), dir)
}

/// RFC-3339 UTC strings compare chronologically as plain strings; `None`
/// sorts last in both directions.
fn cmp_opt_date(a: &Option<String>, b: &Option<String>, dir: SortDir) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => apply_dir(x.cmp(y), dir),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn apply_dir(ord: Ordering, dir: SortDir) -> Ordering {
    match dir {
        SortDir::Asc => ord,
        SortDir::Desc => ord.reverse(),
    }
}
