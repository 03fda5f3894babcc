//! Line-oriented commands over a local [`Repository`].

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

use crate::exec::QueryResult;
use crate::repository::{ContentStream, Repository, UnfileObject, VersioningState, ROOT_FOLDER_ID};
use crate::types::TypeContainer;
use super::Table;

pub const HELP: &str = "\
Commands:
  pwd                         show the current folder
  cd <path>                   change the current folder
  ls [path]                   list a folder
  mkdir <name>                create a folder in the current folder
  put <name> <text...>        create a text document in the current folder
  cat <path>                  print a document's content
  rm <path>                   delete an object
  rmtree <path>               delete a folder and everything below it
  mv <path> <folder>          move an object into another folder
  checkout <path>             check out a document
  checkin <path> [minor]      check in a private working copy
  versions <path>             list the versions of a document
  types                       show the type hierarchy
  SELECT ...                  run a query
  help                        show this help
  quit | exit                 leave the shell";

/// Result of one shell line.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Output(String),
    Quit,
}

pub struct Shell {
    repo: Repository,
    cwd: String,
}

impl Shell {
    pub fn new(repo: Repository) -> Self { Self { repo, cwd: "/".to_string() } }

    pub fn repository(&self) -> &Repository { &self.repo }

    pub fn cwd(&self) -> &str { &self.cwd }

    pub fn execute(&mut self, line: &str) -> Result<Step> {
        let line = line.trim();
        let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        debug!(target: "folio::cli", "command {}", cmd);
        let out = match cmd.to_ascii_lowercase().as_str() {
            "" => String::new(),
            "quit" | "exit" => return Ok(Step::Quit),
            "help" => HELP.to_string(),
            "pwd" => self.cwd.clone(),
            "cd" => {
                let path = self.absolute(if rest.is_empty() { "/" } else { rest });
                let f = self.repo.get_object_by_path(&path)?;
                if f.path().is_none() { bail!("{} is not a folder", path); }
                self.cwd = path;
                String::new()
            }
            "ls" => self.list(if rest.is_empty() { "." } else { rest })?,
            "mkdir" => {
                let parent = self.folder_id(".")?;
                let mut d = self.repo.create_folder(&parent, "cmis:folder")?;
                d.set_name(required(rest, "mkdir <name>")?)?;
                self.repo.save_object(d)?
            }
            "put" => {
                let (name, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let parent = self.folder_id(".")?;
                let mut d = self.repo.create_document(Some(&parent), "cmis:document", VersioningState::Major)?;
                d.set_name(required(name, "put <name> <text...>")?)?;
                d.set_content_stream(ContentStream::text(text.trim()).with_file_name(name))?;
                self.repo.save_object(d)?
            }
            "cat" => {
                let id = self.object_id(required(rest, "cat <path>")?)?;
                let c = self.repo.get_content_stream(&id)?;
                String::from_utf8_lossy(&c.bytes).into_owned()
            }
            "rm" => {
                let id = self.object_id(required(rest, "rm <path>")?)?;
                self.repo.delete_object(&id, false)?;
                String::new()
            }
            "rmtree" => {
                let id = self.folder_id(required(rest, "rmtree <path>")?)?;
                let outcome = self.repo.delete_tree(&id, true, UnfileObject::Delete, true)?;
                if outcome.is_success() {
                    String::new()
                } else {
                    outcome.failed.iter().map(|f| format!("not deleted: {} ({})", f.object_id, f.error)).collect::<Vec<_>>().join("\n")
                }
            }
            "mv" => {
                let mut args = rest.split_whitespace();
                let (Some(src), Some(dst)) = (args.next(), args.next()) else { bail!("usage: mv <path> <folder>") };
                let obj = self.repo.get_object_by_path(&self.absolute(src))?;
                let source = obj.parent_ids.first().cloned().ok_or_else(|| anyhow!("{} is not filed", src))?;
                let target = self.folder_id(dst)?;
                let moved = self.repo.move_object(&obj.id, &target, &source)?;
                self.repo.get_object_path(&moved.id)?.unwrap_or(moved.id)
            }
            "checkout" => {
                let id = self.object_id(required(rest, "checkout <path>")?)?;
                self.repo.check_out(&id)?
            }
            "checkin" => {
                let mut args = rest.split_whitespace();
                let path = args.next().ok_or_else(|| anyhow!("usage: checkin <path> [minor]"))?;
                let major = !matches!(args.next(), Some(m) if m.eq_ignore_ascii_case("minor"));
                let id = self.working_copy_of(path)?;
                let id = self.repo.check_in(&id, major, None)?;
                self.repo.get_object(&id)?.version_label().unwrap_or("").to_string()
            }
            "versions" => {
                let id = self.object_id(required(rest, "versions <path>")?)?;
                let series = self.repo.get_object(&id)?.version_series_id
                    .ok_or_else(|| anyhow!("{} is not a document", rest))?;
                let rows = self.repo.get_all_versions(&series)?.into_iter()
                    .map(|v| vec![v.version_label().unwrap_or("").to_string(), v.id.clone(), v.is_latest_version().to_string()])
                    .collect();
                Table { columns: vec!["label".into(), "id".into(), "latest".into()], rows }.render()
            }
            "types" => {
                let mut lines = Vec::new();
                for base in self.repo.get_type_descendants(None, None, false)? { type_lines(&base, 0, &mut lines); }
                lines.join("\n")
            }
            "select" => {
                let rows: Vec<QueryResult> = self.repo.query(line)?.collect();
                Table::from_results(&rows).render()
            }
            other => bail!("unknown command '{}'; type 'help' for commands", other),
        };
        Ok(Step::Output(out))
    }

    fn absolute(&self, path: &str) -> String {
        let joined = if path.starts_with('/') { path.to_string() } else { format!("{}/{}", self.cwd, path) };
        let mut segments: Vec<&str> = Vec::new();
        for s in joined.split('/') {
            match s {
                "" | "." => {}
                ".." => { segments.pop(); }
                s => segments.push(s),
            }
        }
        format!("/{}", segments.join("/"))
    }

    fn object_id(&self, path: &str) -> Result<String> {
        Ok(self.repo.get_object_by_path(&self.absolute(path))?.id)
    }

    fn folder_id(&self, path: &str) -> Result<String> {
        let abs = self.absolute(path);
        if abs == "/" { return Ok(ROOT_FOLDER_ID.to_string()); }
        let f = self.repo.get_object_by_path(&abs)?;
        if f.path().is_none() { bail!("{} is not a folder", abs); }
        Ok(f.id)
    }

    // a path names both the working copy and the version it was taken from
    fn working_copy_of(&self, path: &str) -> Result<String> {
        let parent = self.folder_id(&format!("{}/..", self.absolute(path)))?;
        let name = self.absolute(path).rsplit('/').next().unwrap_or("").to_string();
        self.repo.get_checked_out_documents(Some(&parent))?.into_iter()
            .find(|d| d.name() == name)
            .map(|d| d.id)
            .with_context(|| format!("{} is not checked out", path))
    }

    fn list(&self, path: &str) -> Result<String> {
        let id = self.folder_id(path)?;
        let page = self.repo.get_children(&id, 0, None)?;
        let rows = page.objects.iter().map(|o| {
            let kind = if o.is_private_working_copy { "pwc".to_string() } else { o.base.type_id().trim_start_matches("cmis:").to_string() };
            vec![o.name().to_string(), kind, o.version_label().unwrap_or("").to_string(), o.id.clone()]
        }).collect();
        Ok(Table { columns: vec!["name".into(), "kind".into(), "version".into(), "id".into()], rows }.render())
    }
}

fn required<'a>(arg: &'a str, usage: &str) -> Result<&'a str> {
    if arg.is_empty() { bail!("usage: {}", usage); }
    Ok(arg)
}

fn type_lines(c: &TypeContainer, depth: usize, out: &mut Vec<String>) {
    out.push(format!("{}{}", "  ".repeat(depth), c.type_def.id));
    for child in &c.children { type_lines(child, depth + 1, out); }
}
