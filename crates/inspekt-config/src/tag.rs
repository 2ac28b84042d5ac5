use serde::Deserialize;

/// Enum tags are written by name but older documents store the numeric index.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TagRepr {
  Name(String),
  Index(u64),
}

pub(crate) fn resolve<T: Copy>(repr: TagRepr, table: &[(&str, T)], what: &str) -> Result<T, String> {
  match repr {
    TagRepr::Name(name) => table
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(&name))
      .map(|(_, v)| *v)
      .ok_or_else(|| format!("unknown {what} '{name}'")),
    TagRepr::Index(index) => table
      .get(index as usize)
      .map(|(_, v)| *v)
      .ok_or_else(|| format!("unknown {what} index {index}")),
  }
}
