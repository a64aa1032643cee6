//! Joined accessibility/DOM tree.
//!
//! The accessibility tree is the agent-readable view (roles and names); the
//! DOM tree is the actionable addressing view (tags and XPaths). Joining them
//! lets a caller name a node by its accessibility id and act on the backing
//! element. Each build also emits the id→XPath map that numeric selector
//! tokens resolve through; the map is valid until the next build and goes
//! stale on DOM mutation — stale ids surface later as "element not found".

use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Context, Result};
use chromiumoxide::cdp::browser_protocol::accessibility::GetFullAxTreeParams;
use chromiumoxide::cdp::browser_protocol::dom::{GetDocumentParams, Node};
use chromiumoxide::page::Page;

use crate::core::types::TreeNode;

const ELEMENT_NODE: i64 = 1;
const DOCUMENT_NODE: i64 = 9;

/// DOM subset the join needs, decoupled from the wire structs.
struct DomElement {
    backend_id: i64,
    tag: String,
    children: Vec<DomElement>,
}

/// Accessibility subset the join needs.
struct AxRecord {
    id: u64,
    role: String,
    name: Option<String>,
    backend_id: Option<i64>,
    child_ids: Vec<u64>,
}

pub struct TreeBuild {
    pub tree: TreeNode,
    pub id_map: HashMap<u64, String>,
}

/// Build the joined view for the page: full AX tree + full DOM tree over CDP,
/// DOM walked depth-first for XPaths, AX walked from its root with each node
/// annotated by its backing element.
pub async fn build_tree(page: &Page) -> Result<TreeBuild> {
    let mut doc_params = GetDocumentParams::default();
    doc_params.depth = Some(-1);
    let doc = page
        .execute(doc_params)
        .await
        .context("Failed to fetch DOM tree")?;

    let ax = page
        .execute(GetFullAxTreeParams::default())
        .await
        .context("Failed to fetch accessibility tree")?;

    let dom_root = convert_dom(&doc.root)
        .ok_or_else(|| anyhow!("DOM tree has no element root"))?;

    let ax_records: Vec<AxRecord> = ax.nodes.iter().filter_map(convert_ax).collect();
    if ax_records.is_empty() {
        return Err(anyhow!("Accessibility tree is empty"));
    }

    Ok(join(&dom_root, &ax_records))
}

/// Lower a CDP DOM node into the element-only view. The document node itself
/// is transparent: its element child (normally `<html>`) becomes the root.
fn convert_dom(node: &Node) -> Option<DomElement> {
    if node.node_type == DOCUMENT_NODE {
        return node
            .children
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find_map(convert_dom);
    }
    if node.node_type != ELEMENT_NODE {
        return None;
    }
    let children = node
        .children
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter_map(convert_dom)
        .collect();
    Some(DomElement {
        backend_id: *node.backend_node_id.inner(),
        tag: node.local_name.to_ascii_lowercase(),
        children,
    })
}

fn convert_ax(node: &chromiumoxide::cdp::browser_protocol::accessibility::AxNode) -> Option<AxRecord> {
    let id = node.node_id.inner().parse::<u64>().ok()?;
    let role = node
        .role
        .as_ref()
        .and_then(|r| r.value.as_ref())
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let name = node
        .name
        .as_ref()
        .and_then(|n| n.value.as_ref())
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .filter(|s| !s.is_empty());
    let backend_id = node.backend_dom_node_id.as_ref().map(|b| *b.inner());
    let child_ids = node
        .child_ids
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter_map(|c| c.inner().parse::<u64>().ok())
        .collect();
    Some(AxRecord {
        id,
        role,
        name,
        backend_id,
        child_ids,
    })
}

/// Depth-first XPath assignment. A segment is `tag`, or `tag[k]` (1-based)
/// when the element has same-tag siblings.
fn index_dom(root: &DomElement) -> HashMap<i64, (String, String)> {
    let mut map = HashMap::new();
    let root_xpath = format!("/{}", root.tag);
    map.insert(root.backend_id, (root.tag.clone(), root_xpath.clone()));
    index_children(root, &root_xpath, &mut map);
    map
}

fn index_children(parent: &DomElement, parent_xpath: &str, map: &mut HashMap<i64, (String, String)>) {
    let mut tag_totals: HashMap<&str, usize> = HashMap::new();
    for child in &parent.children {
        *tag_totals.entry(child.tag.as_str()).or_default() += 1;
    }
    let mut tag_seen: HashMap<&str, usize> = HashMap::new();
    for child in &parent.children {
        let seen = tag_seen.entry(child.tag.as_str()).or_default();
        *seen += 1;
        let segment = if tag_totals[child.tag.as_str()] > 1 {
            format!("{}[{}]", child.tag, seen)
        } else {
            child.tag.clone()
        };
        let xpath = format!("{parent_xpath}/{segment}");
        map.insert(child.backend_id, (child.tag.clone(), xpath.clone()));
        index_children(child, &xpath, map);
    }
}

fn join(dom_root: &DomElement, ax_records: &[AxRecord]) -> TreeBuild {
    let dom_index = index_dom(dom_root);
    let by_id: HashMap<u64, &AxRecord> = ax_records.iter().map(|r| (r.id, r)).collect();

    // The root is any node never referenced as a child; fall back to the
    // first node the browser returned.
    let referenced: HashSet<u64> = ax_records
        .iter()
        .flat_map(|r| r.child_ids.iter().copied())
        .collect();
    let root = ax_records
        .iter()
        .find(|r| !referenced.contains(&r.id))
        .unwrap_or(&ax_records[0]);

    let mut id_map = HashMap::new();
    let mut visiting = HashSet::new();
    let tree = build_node(root, &by_id, &dom_index, &mut id_map, &mut visiting);
    TreeBuild { tree, id_map }
}

fn build_node(
    record: &AxRecord,
    by_id: &HashMap<u64, &AxRecord>,
    dom_index: &HashMap<i64, (String, String)>,
    id_map: &mut HashMap<u64, String>,
    visiting: &mut HashSet<u64>,
) -> TreeNode {
    let dom = record
        .backend_id
        .and_then(|b| dom_index.get(&b));
    let tag = dom.map(|(tag, _)| format!("<{tag}>"));
    let xpath = dom.map(|(_, xpath)| xpath.clone());
    if let Some(xpath) = &xpath {
        id_map.insert(record.id, xpath.clone());
    }

    visiting.insert(record.id);
    let child_ids: Vec<u64> = record
        .child_ids
        .iter()
        .filter(|id| !visiting.contains(id))
        .copied()
        .collect();
    let children = child_ids
        .iter()
        .filter_map(|id| by_id.get(id))
        .map(|child| build_node(child, by_id, dom_index, id_map, visiting))
        .collect();

    TreeNode {
        id: record.id,
        role: record.role.clone(),
        name: record.name.clone(),
        tag,
        xpath,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(backend_id: i64, tag: &str, children: Vec<DomElement>) -> DomElement {
        DomElement {
            backend_id,
            tag: tag.to_string(),
            children,
        }
    }

    fn ax(id: u64, role: &str, backend_id: Option<i64>, child_ids: Vec<u64>) -> AxRecord {
        AxRecord {
            id,
            role: role.to_string(),
            name: None,
            backend_id,
            child_ids,
        }
    }

    /// `<html><body><ul><li>a</li><li>b</li></ul></body></html>`
    fn list_dom() -> DomElement {
        el(
            1,
            "html",
            vec![el(
                2,
                "body",
                vec![el(3, "ul", vec![el(4, "li", vec![]), el(5, "li", vec![])])],
            )],
        )
    }

    #[test]
    fn xpath_indexes_only_duplicated_siblings() {
        let index = index_dom(&list_dom());
        assert_eq!(index[&1].1, "/html");
        assert_eq!(index[&2].1, "/html/body");
        assert_eq!(index[&3].1, "/html/body/ul");
        assert_eq!(index[&4].1, "/html/body/ul/li[1]");
        assert_eq!(index[&5].1, "/html/body/ul/li[2]");
    }

    #[test]
    fn join_copies_xpaths_into_id_map() {
        let records = vec![
            ax(10, "RootWebArea", Some(1), vec![11]),
            ax(11, "list", Some(3), vec![12, 13]),
            ax(12, "listitem", Some(4), vec![]),
            ax(13, "listitem", Some(5), vec![]),
        ];
        let build = join(&list_dom(), &records);

        assert_eq!(build.tree.id, 10);
        assert_eq!(build.tree.children.len(), 1);
        let list = &build.tree.children[0];
        assert_eq!(list.role, "list");
        assert_eq!(list.tag.as_deref(), Some("<ul>"));
        assert_eq!(
            list.children[0].xpath.as_deref(),
            Some("/html/body/ul/li[1]")
        );
        assert_eq!(
            list.children[1].xpath.as_deref(),
            Some("/html/body/ul/li[2]")
        );

        assert_eq!(build.id_map[&12], "/html/body/ul/li[1]");
        assert_eq!(build.id_map[&13], "/html/body/ul/li[2]");
    }

    #[test]
    fn root_is_the_unreferenced_node() {
        // Order scrambled on purpose; 20 is the only node nobody points at.
        let records = vec![
            ax(21, "list", Some(3), vec![]),
            ax(20, "RootWebArea", Some(1), vec![21]),
        ];
        let build = join(&list_dom(), &records);
        assert_eq!(build.tree.id, 20);
    }

    #[test]
    fn nodes_without_backing_element_have_null_tag_and_xpath() {
        let records = vec![
            ax(1, "RootWebArea", Some(1), vec![2]),
            ax(2, "generic", None, vec![]),
        ];
        let build = join(&list_dom(), &records);
        let child = &build.tree.children[0];
        assert!(child.tag.is_none());
        assert!(child.xpath.is_none());
        assert!(!build.id_map.contains_key(&2));
    }

    #[test]
    fn child_cycles_do_not_recurse_forever() {
        let records = vec![
            ax(1, "RootWebArea", Some(1), vec![2]),
            ax(2, "group", Some(2), vec![1]),
        ];
        let build = join(&list_dom(), &records);
        assert_eq!(build.tree.children.len(), 1);
        assert!(build.tree.children[0].children.is_empty());
    }
}
