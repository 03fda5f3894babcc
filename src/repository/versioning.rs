use tracing::info;

use crate::error::{RepoError, RepoResult};
use crate::types::props;
use crate::value::Value;
use super::entry::{DocumentState, EntryKind, ObjectData, ObjectEntry};
use super::naming::next_version_label;
use super::{new_object_id, Repository, Scope, Tx};

impl Repository {
    /// Creates the private working copy of the latest version. Returns its id.
    pub fn check_out(&self, id: &str) -> RepoResult<String> {
        let principal = self.default_principal().to_string();
        let pwc = new_object_id();
        self.write(Scope::All, &principal, |tx| tx.check_out(id, &pwc))?;
        info!(target: "folio::store", "checked out {} as {}", id, pwc);
        Ok(pwc)
    }

    /// Turns the working copy into the new latest version. Returns its id, which is unchanged.
    pub fn check_in(&self, pwc: &str, major: bool, comment: Option<&str>) -> RepoResult<String> {
        let principal = self.default_principal().to_string();
        self.write(Scope::All, &principal, |tx| tx.check_in(pwc, major, comment))?;
        info!(target: "folio::store", "checked in {}", pwc);
        Ok(pwc.to_string())
    }

    pub fn cancel_check_out(&self, pwc: &str) -> RepoResult<()> {
        let principal = self.default_principal().to_string();
        self.write(Scope::All, &principal, |tx| tx.cancel_check_out(pwc))
    }

    /// Working copy first, then versions newest first.
    pub fn get_all_versions(&self, series_id: &str) -> RepoResult<Vec<ObjectData>> {
        self.read(|st| {
            let series = st.series.get(series_id)
                .ok_or_else(|| RepoError::not_found(format!("Version series {} does not exist", series_id)))?;
            Ok(series.working_copy.iter()
                .chain(series.versions.iter().rev())
                .filter_map(|v| st.objects.get(v))
                .map(|e| st.snapshot(e))
                .collect())
        })
    }

    /// Working copies, optionally only those filed in `folder`, ordered by path then id.
    pub fn get_checked_out_documents(&self, folder: Option<&str>) -> RepoResult<Vec<ObjectData>> {
        self.read(|st| {
            let folder = match folder {
                Some(f) => Some(st.resolve_ref(f)?.id.as_str()),
                None => None,
            };
            if let Some(f) = folder { st.folder(f)?; }
            let mut out: Vec<(Option<String>, ObjectData)> = st.series.values()
                .filter_map(|s| s.working_copy.as_ref())
                .filter_map(|w| st.objects.get(w))
                .filter(|e| folder.map(|f| e.parents.iter().any(|p| p == f)).unwrap_or(true))
                .map(|e| (st.path_of(&e.id), st.snapshot(e)))
                .collect();
            out.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
            Ok(out.into_iter().map(|(_, d)| d).collect())
        })
    }
}

impl Tx<'_> {
    fn check_out(&mut self, id: &str, pwc_id: &str) -> RepoResult<()> {
        let e = self.state.get(id)?;
        let t = self.type_of(e)?;
        let Some(doc) = e.document() else {
            return Err(RepoError::constraint(format!("Object {} is not a document", id)));
        };
        if !t.versionable {
            return Err(RepoError::constraint(format!("Type {} is not versionable", t.id)));
        }
        if doc.is_pwc {
            return Err(RepoError::versioning(format!("Object {} is a private working copy", id)));
        }
        let series_id = doc.series_id.clone();
        let series = self.state.series.get(&series_id)
            .ok_or_else(|| RepoError::not_found(format!("Version series {} does not exist", series_id)))?;
        if series.working_copy.is_some() {
            return Err(RepoError::versioning(format!("Version series {} is already checked out", series_id)));
        }
        if series.latest() != Some(id) {
            return Err(RepoError::versioning(format!("Object {} is not the latest version", id)));
        }

        let mut properties = e.properties.clone();
        properties.insert(props::OBJECT_ID.to_string(), Value::id(pwc_id));
        properties.insert(props::CREATED_BY.to_string(), Value::string(self.principal));
        properties.insert(props::CREATION_DATE.to_string(), Value::datetime(self.now));
        properties.insert(props::VERSION_LABEL.to_string(), Value::string("pwc"));
        for flag in [props::IS_LATEST_VERSION, props::IS_MAJOR_VERSION, props::IS_LATEST_MAJOR_VERSION] {
            properties.insert(flag.to_string(), Value::boolean(false));
        }
        properties.remove(props::CHECKIN_COMMENT);
        let pwc = ObjectEntry {
            id: pwc_id.to_string(),
            type_id: e.type_id.clone(),
            base: e.base,
            properties,
            acl: e.acl.clone(),
            policies: e.policies.clone(),
            parents: e.parents.clone(),
            kind: EntryKind::Document(DocumentState { content: doc.content.clone(), series_id: series_id.clone(), is_pwc: true }),
        };
        let members = series.versions.clone();

        for p in &pwc.parents {
            if let Some(children) = self.state.get_mut(p)?.children_mut() { children.push(pwc_id.to_string()); }
        }
        self.state.objects.insert(pwc_id.to_string(), pwc);
        if let Some(series) = self.state.series.get_mut(&series_id) {
            series.working_copy = Some(pwc_id.to_string());
            series.checked_out_by = Some(self.principal.to_string());
        }
        self.mark_created(pwc_id);
        self.stamp(pwc_id)?;
        for v in &members { self.touch(v); }
        Ok(())
    }

    fn check_in(&mut self, pwc_id: &str, major: bool, comment: Option<&str>) -> RepoResult<()> {
        let e = self.state.get(pwc_id)?;
        let Some(series_id) = e.document().filter(|d| d.is_pwc).map(|d| d.series_id.clone()) else {
            return Err(RepoError::versioning(format!("Object {} is not a private working copy", pwc_id)));
        };
        let previous = self.state.series.get(&series_id).and_then(|s| s.latest()).map(|s| s.to_string());
        let previous_label = previous.as_deref()
            .and_then(|p| self.state.objects.get(p))
            .and_then(|p| p.properties.get(props::VERSION_LABEL))
            .and_then(|v| v.first_str());
        let label = next_version_label(previous_label, major);

        // the new version takes over every filing of the one it replaces
        let mut moved_filings = Vec::new();
        if let Some(prev) = &previous {
            let prev_entry = self.state.get_mut(prev)?;
            prev_entry.set(props::IS_LATEST_VERSION, Value::boolean(false));
            moved_filings = std::mem::take(&mut prev_entry.parents);
            for f in &moved_filings {
                if let Some(children) = self.state.objects.get_mut(f).and_then(|f| f.children_mut()) {
                    children.retain(|c| c != prev);
                    if !children.iter().any(|c| c == pwc_id) { children.push(pwc_id.to_string()); }
                }
            }
            self.touch(prev);
        }

        let e = self.state.get_mut(pwc_id)?;
        if let Some(doc) = e.document_mut() { doc.is_pwc = false; }
        e.set(props::VERSION_LABEL, Value::string(label));
        e.set(props::IS_LATEST_VERSION, Value::boolean(true));
        e.set(props::IS_MAJOR_VERSION, Value::boolean(major));
        e.set(props::CHECKIN_COMMENT, Value::String(comment.map(|c| c.to_string()).into_iter().collect()));
        for f in moved_filings {
            if !e.parents.contains(&f) { e.parents.push(f); }
        }
        if let Some(series) = self.state.series.get_mut(&series_id) {
            series.versions.push(pwc_id.to_string());
            series.working_copy = None;
            series.checked_out_by = None;
        }
        self.stamp(pwc_id)?;
        self.refresh_latest_major(&series_id)?;
        self.touch_series(&series_id);
        Ok(())
    }

    pub(super) fn cancel_check_out(&mut self, pwc_id: &str) -> RepoResult<()> {
        let e = self.state.get(pwc_id)?;
        let Some(series_id) = e.document().filter(|d| d.is_pwc).map(|d| d.series_id.clone()) else {
            return Err(RepoError::versioning(format!("Object {} is not a private working copy", pwc_id)));
        };
        self.remove_entry(pwc_id);
        if let Some(series) = self.state.series.get_mut(&series_id) {
            series.working_copy = None;
            series.checked_out_by = None;
            if series.is_empty() { self.state.series.remove(&series_id); }
        }
        self.touch_series(&series_id);
        Ok(())
    }

    /// Only the newest major version carries `isLatestMajorVersion`.
    pub(super) fn refresh_latest_major(&mut self, series_id: &str) -> RepoResult<()> {
        let Some(series) = self.state.series.get(series_id) else { return Ok(()) };
        let versions = series.versions.clone();
        let latest_major = versions.iter().rev()
            .find(|v| self.state.objects.get(v.as_str()).map(|e| e.flag(props::IS_MAJOR_VERSION)).unwrap_or(false))
            .cloned();
        for v in versions {
            let wanted = latest_major.as_deref() == Some(v.as_str());
            let e = self.state.get_mut(&v)?;
            if e.flag(props::IS_LATEST_MAJOR_VERSION) != wanted {
                e.set(props::IS_LATEST_MAJOR_VERSION, Value::boolean(wanted));
                self.touch(&v);
            }
        }
        Ok(())
    }

    // derived check-out properties change on every member
    fn touch_series(&mut self, series_id: &str) {
        let members: Vec<String> = self.state.series.get(series_id)
            .map(|s| s.versions.iter().chain(s.working_copy.iter()).cloned().collect())
            .unwrap_or_default();
        for m in members { self.touch(&m); }
    }
}
