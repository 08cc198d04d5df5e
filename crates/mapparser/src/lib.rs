//! Textual map parser.
//!
//! The format has three top-level blocks, in order:
//!
//! ```text
//! device <n> osd.<id> [class <name>]
//!
//! <bucket-type> <name> {
//!     id -<n>
//!     alg uniform|straw2
//!     hash 0
//!     item <name> [weight <float>]
//! }
//!
//! rule <name> {
//!     id <n>
//!     type replicated
//!     min_size <n>
//!     max_size <n>
//!     step take <bucket> [class <name>]
//!     step choose|chooseleaf firstn <N> type <bucket-type|osd>
//!     step emit
//! }
//! ```
//!
//! Buckets are declared bottom-up (children before parents); exactly
//! one `root`-typed bucket is allowed and every bucket must be
//! reachable from it. Errors carry the offending line with a caret
//! under the failing column.

pub mod error;

use std::collections::{BTreeMap, HashMap, HashSet};

use crush::{
    Bucket, BucketAlg, BucketId, ChooseKind, Device, DeviceId, Hierarchy, NodeType, Rule, Step,
    Weight,
};

pub use error::{ParseError, Result};

/// Parser output: the assembled hierarchy plus every rule block.
#[derive(Debug, Clone)]
pub struct ParsedMap {
    pub hierarchy: Hierarchy,
    pub rules: Vec<Rule>,
}

/// Parse a full map text.
pub fn parse(text: &str) -> Result<ParsedMap> {
    Parser::new(text).run()
}

#[derive(Debug, Clone)]
struct DeviceDecl {
    id: DeviceId,
    class: Option<String>,
}

struct Parser<'a> {
    src: &'a str,
    text: &'a [u8],
    cursor: usize,
    row: usize,
    col: usize,
    line_start: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Parser<'a> {
        Parser {
            src,
            text: src.as_bytes(),
            cursor: 0,
            row: 1,
            col: 1,
            line_start: 0,
        }
    }

    fn run(mut self) -> Result<ParsedMap> {
        self.skip_ws();
        let decls = self.parse_devices()?;
        let (root, buckets, devices, bucket_names) = self.parse_buckets(&decls)?;
        let rules = self.parse_rules(&bucket_names)?;

        let mut hierarchy = Hierarchy::from_parts(root, buckets, devices)
            .map_err(|e| ParseError::plain(e.to_string()))?;
        hierarchy.recompute_subtree_weights();
        Ok(ParsedMap { hierarchy, rules })
    }

    // ---- low-level cursor helpers ----

    fn at_end(&self) -> bool {
        self.cursor >= self.text.len()
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
        self.col += n;
    }

    fn match_prefix(&self, target: &str) -> bool {
        self.text[self.cursor.min(self.text.len())..].starts_with(target.as_bytes())
    }

    /// `target` at the cursor, followed by whitespace (or the end of
    /// input).
    fn match_substr(&self, target: &str) -> bool {
        let t = target.as_bytes();
        if self.at_end() {
            return false;
        }
        let end = self.cursor + t.len();
        if end > self.text.len() {
            return false;
        }
        if &self.text[self.cursor..end] != t {
            return false;
        }
        end == self.text.len() || self.text[end].is_ascii_whitespace()
    }

    /// Digits at the cursor, valid only when followed by whitespace or
    /// the end of input.
    fn read_num(&self) -> Option<&'a str> {
        let mut new = self.cursor;
        while new < self.text.len() && self.text[new].is_ascii_digit() {
            new += 1;
        }
        if new == self.cursor {
            return None;
        }
        if new >= self.text.len() || self.text[new].is_ascii_whitespace() {
            return Some(&self.src[self.cursor..new]);
        }
        None
    }

    fn read_float(&self) -> Option<&'a str> {
        let mut new = self.cursor;
        while new < self.text.len() && self.text[new].is_ascii_digit() {
            new += 1;
        }
        let nonempty_prefix = new != self.cursor;

        if new < self.text.len() && self.text[new] == b'.' {
            new += 1;
        }

        let suffix_start = new;
        while new < self.text.len() && self.text[new].is_ascii_digit() {
            new += 1;
        }
        let nonempty_suffix = suffix_start != new;

        if (nonempty_prefix || nonempty_suffix)
            && (new >= self.text.len() || self.text[new].is_ascii_whitespace())
        {
            return Some(&self.src[self.cursor..new]);
        }
        None
    }

    /// A word: alphabetic start, then alphanumerics or `-_.`.
    fn read_word(&self) -> Option<&'a str> {
        let mut new = self.cursor;
        if new >= self.text.len() || !self.text[new].is_ascii_alphabetic() {
            return None;
        }
        new += 1;
        while new < self.text.len()
            && (self.text[new].is_ascii_alphanumeric() || b"-_.".contains(&self.text[new]))
        {
            new += 1;
        }
        Some(&self.src[self.cursor..new])
    }

    fn read_bucket_type(&self) -> Option<NodeType> {
        NodeType::BUCKET_TYPES
            .into_iter()
            .find(|t| self.match_substr(t.as_str()))
    }

    fn skip_ws(&mut self) {
        while self.cursor < self.text.len() && self.text[self.cursor].is_ascii_whitespace() {
            if self.text[self.cursor] == b'\n' {
                self.row += 1;
                self.col = 0;
                self.line_start = self.cursor + 1;
            }
            self.advance(1);
        }
    }

    /// Skip whitespace that must cross at least one line break (the end
    /// of input also terminates a line).
    fn skip_ws_required_newline(&mut self) -> Result<()> {
        let mut found = false;
        while self.cursor < self.text.len() && self.text[self.cursor].is_ascii_whitespace() {
            if self.text[self.cursor] == b'\n' {
                found = true;
                self.row += 1;
                self.col = 0;
                self.line_start = self.cursor + 1;
            }
            self.advance(1);
        }
        if !found && !self.at_end() {
            return Err(self.err_with_line("expected a line break"));
        }
        Ok(())
    }

    /// Skip spaces and tabs up to the next token on this line. Requires
    /// at least one unless the cursor already rests on whitespace or a
    /// brace.
    fn skip_space_inline(&mut self) -> Result<()> {
        let mut new = self.cursor;
        while new < self.text.len() && (self.text[new] == b' ' || self.text[new] == b'\t') {
            new += 1;
        }
        if new == self.cursor && !self.at_end() {
            let c = self.text[self.cursor];
            if !c.is_ascii_whitespace() && c != b'{' && c != b'}' {
                return Err(self.err_with_line("expected a blank space"));
            }
        }
        self.advance(new - self.cursor);
        Ok(())
    }

    fn err_with_line(&self, msg: &str) -> ParseError {
        let line_end = if self.cursor < self.text.len() {
            self.src[self.cursor..]
                .find('\n')
                .map_or(self.src.len(), |i| self.cursor + i)
        } else {
            self.src.len()
        };
        let line = &self.src[self.line_start.min(line_end)..line_end];
        let prefix = format!("{} | ", self.row);
        let message = format!(
            "{}{}\n{}^\n{}{}\n",
            prefix,
            line,
            " ".repeat(prefix.len() + self.col.saturating_sub(1)),
            " ".repeat(prefix.len()),
            msg,
        );
        ParseError {
            row: self.row,
            col: self.col,
            message,
        }
    }

    // ---- devices ----

    fn parse_devices(&mut self) -> Result<HashMap<String, DeviceDecl>> {
        let mut decls: HashMap<String, DeviceDecl> = HashMap::new();
        let mut device_nums: HashSet<String> = HashSet::new();
        let mut seen_ids: HashSet<String> = HashSet::new();

        loop {
            if !self.match_substr("device") {
                if self.read_bucket_type().is_some() {
                    return Ok(decls);
                }
                return Err(self.err_with_line("expected \"device\" or a bucket declaration"));
            }
            self.advance("device".len());
            self.skip_space_inline()?;

            let Some(device_num) = self.read_num() else {
                return Err(self.err_with_line("expected a device number"));
            };
            if !device_nums.insert(device_num.to_string()) {
                return Err(self.err_with_line("device with this number is already defined"));
            }
            self.advance(device_num.len());
            self.skip_space_inline()?;

            if !self.match_prefix("osd.") {
                return Err(self.err_with_line("expected an osd id declaration"));
            }
            self.advance("osd.".len());
            let Some(osd_id) = self.read_num() else {
                return Err(self.err_with_line("bad osd declaration: expected a number"));
            };
            if !seen_ids.insert(osd_id.to_string()) {
                return Err(self.err_with_line("osd id already registered"));
            }
            let id: DeviceId = osd_id
                .parse()
                .map_err(|_| self.err_with_line("osd id out of range"))?;
            if id == 0 {
                return Err(self.err_with_line("osd ids are strictly positive"));
            }
            self.advance(osd_id.len());
            self.skip_space_inline()?;

            let class = if self.match_substr("class") {
                self.advance("class".len());
                self.skip_space_inline()?;
                let Some(class_name) = self.read_word() else {
                    return Err(self.err_with_line("expected a device class"));
                };
                self.advance(class_name.len());
                Some(class_name.to_string())
            } else {
                None
            };

            decls.insert(format!("osd.{}", id), DeviceDecl { id, class });
            self.skip_ws_required_newline()?;
        }
    }

    // ---- buckets ----

    #[allow(clippy::type_complexity)]
    fn parse_buckets(
        &mut self,
        decls: &HashMap<String, DeviceDecl>,
    ) -> Result<(
        BucketId,
        HashMap<BucketId, Bucket>,
        BTreeMap<DeviceId, Device>,
        HashSet<String>,
    )> {
        let mut by_name: HashMap<String, BucketId> = HashMap::new();
        let mut buckets: HashMap<BucketId, Bucket> = HashMap::new();
        let mut devices: BTreeMap<DeviceId, Device> = BTreeMap::new();
        let mut seen_raw_ids: HashSet<String> = HashSet::new();
        let mut child2parent: HashMap<String, String> = HashMap::new();
        let mut root: Option<BucketId> = None;

        loop {
            let Some(kind) = self.read_bucket_type() else {
                if self.match_substr("rule") {
                    break;
                }
                return Err(self.err_with_line("expected a bucket type"));
            };
            self.advance(kind.as_str().len());
            self.skip_space_inline()?;

            let Some(name) = self.read_word() else {
                return Err(self.err_with_line("expected a bucket name"));
            };
            if by_name.contains_key(name) {
                return Err(
                    self.err_with_line(&format!("bucket with name `{}` already exists", name))
                );
            }
            let name = name.to_string();
            self.advance(name.len());
            self.skip_space_inline()?;

            let bucket = self.parse_bucket_block(
                &name,
                kind,
                decls,
                &by_name,
                &mut buckets,
                &mut devices,
                &mut child2parent,
                &mut seen_raw_ids,
            )?;

            if kind == NodeType::Root {
                if let Some(existing) = root {
                    let existing_name = buckets
                        .get(&existing)
                        .map_or_else(String::new, |b| b.name.clone());
                    return Err(self.err_with_line(&format!(
                        "root node already registered: {}",
                        existing_name
                    )));
                }
                root = Some(bucket.id);
            }

            by_name.insert(name, bucket.id);
            buckets.insert(bucket.id, bucket);
            self.skip_ws_required_newline()?;
        }

        let Some(root) = root else {
            return Err(self.err_with_line("no root node found"));
        };

        // every declared bucket must hang off the root
        let mut unreached: HashSet<&str> = by_name
            .keys()
            .map(String::as_str)
            .filter(|&n| {
                buckets
                    .get(&by_name[n])
                    .is_some_and(|b| b.id != root)
            })
            .collect();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(bucket) = buckets.get(&id) {
                for &child in &bucket.children {
                    if child < 0 {
                        if let Some(b) = buckets.get(&child) {
                            unreached.remove(b.name.as_str());
                        }
                        stack.push(child);
                    }
                }
            }
        }
        if !unreached.is_empty() {
            let mut names: Vec<&str> = unreached.into_iter().collect();
            names.sort_unstable();
            return Err(ParseError::plain(format!(
                "found disconnected nodes: {}",
                names.join(",")
            )));
        }

        let bucket_names: HashSet<String> = by_name.keys().cloned().collect();
        Ok((root, buckets, devices, bucket_names))
    }

    #[allow(clippy::too_many_arguments)]
    fn parse_bucket_block(
        &mut self,
        name: &str,
        kind: NodeType,
        decls: &HashMap<String, DeviceDecl>,
        by_name: &HashMap<String, BucketId>,
        buckets: &mut HashMap<BucketId, Bucket>,
        devices: &mut BTreeMap<DeviceId, Device>,
        child2parent: &mut HashMap<String, String>,
        seen_raw_ids: &mut HashSet<String>,
    ) -> Result<Bucket> {
        if !self.match_substr("{") {
            return Err(self.err_with_line("expected a bucket block start"));
        }
        self.advance(1);
        self.skip_ws_required_newline()?;

        let mut bucket_id: Option<BucketId> = None;
        let mut alg: Option<BucketAlg> = None;
        let mut hash: Option<u32> = None;

        loop {
            let Some(field) = self.read_word() else {
                if self.match_substr("}") {
                    return Err(self.err_with_line("found bucket with no children"));
                }
                return Err(self.err_with_line("expected a bucket field"));
            };
            match field {
                "id" => {
                    if bucket_id.is_some() {
                        return Err(self.err_with_line("found double declaration of a field"));
                    }
                    self.advance(field.len());
                    self.skip_space_inline()?;

                    if !self.match_prefix("-") {
                        return Err(
                            self.err_with_line("expected a bucket id (which are always negative)")
                        );
                    }
                    self.advance(1);

                    let Some(raw) = self.read_num() else {
                        return Err(
                            self.err_with_line("expected a bucket id (which are always negative)")
                        );
                    };
                    if !seen_raw_ids.insert(raw.to_string()) {
                        return Err(
                            self.err_with_line(&format!("bucket with id `-{}` already exists", raw))
                        );
                    }
                    let magnitude: i32 = raw
                        .parse()
                        .map_err(|_| self.err_with_line("bucket id out of range"))?;
                    if magnitude == 0 {
                        return Err(
                            self.err_with_line("expected a bucket id (which are always negative)")
                        );
                    }
                    self.advance(raw.len());
                    bucket_id = Some(-magnitude);
                }
                "alg" => {
                    if alg.is_some() {
                        return Err(self.err_with_line("found double declaration of a field"));
                    }
                    self.advance(field.len());
                    self.skip_space_inline()?;

                    let Some(alg_name) = self.read_word() else {
                        return Err(self.err_with_line("expected an algorithm: uniform or straw2"));
                    };
                    self.advance(alg_name.len());
                    alg = Some(match alg_name {
                        "uniform" => BucketAlg::Uniform,
                        "straw2" => BucketAlg::Straw2,
                        _ => {
                            return Err(
                                self.err_with_line("only uniform and straw2 algorithms are allowed")
                            )
                        }
                    });
                }
                "hash" => {
                    if hash.is_some() {
                        return Err(self.err_with_line("found double declaration of a field"));
                    }
                    self.advance(field.len());
                    self.skip_space_inline()?;

                    let Some(h) = self.read_num() else {
                        return Err(self.err_with_line("expected a hash"));
                    };
                    if h != "0" {
                        return Err(self.err_with_line("only `0` hash is supported"));
                    }
                    self.advance(h.len());
                    hash = Some(0);
                }
                "item" => {
                    let Some(id) = bucket_id else {
                        return Err(self.err_with_line("expected the bucket to have an id"));
                    };
                    let mut bucket = Bucket {
                        id,
                        name: name.to_string(),
                        kind,
                        alg: alg.unwrap_or(BucketAlg::Straw2),
                        weight: Weight::OUT_OF_CLUSTER,
                        children: Vec::new(),
                        parent: None,
                    };
                    self.parse_bucket_items(
                        &mut bucket,
                        decls,
                        by_name,
                        buckets,
                        devices,
                        child2parent,
                    )?;

                    if !self.match_substr("}") {
                        return Err(self.err_with_line("expected a bucket block end"));
                    }
                    self.advance(1);
                    return Ok(bucket);
                }
                _ => return Err(self.err_with_line("unknown bucket field")),
            }
            self.skip_ws_required_newline()?;
        }
    }

    fn parse_bucket_items(
        &mut self,
        parent: &mut Bucket,
        decls: &HashMap<String, DeviceDecl>,
        by_name: &HashMap<String, BucketId>,
        buckets: &mut HashMap<BucketId, Bucket>,
        devices: &mut BTreeMap<DeviceId, Device>,
        child2parent: &mut HashMap<String, String>,
    ) -> Result<()> {
        loop {
            if !self.parse_bucket_item(parent, decls, by_name, buckets, devices, child2parent)? {
                return Ok(());
            }
            self.skip_ws_required_newline()?;
        }
    }

    /// One `item` line; `Ok(false)` when the closing brace is next.
    fn parse_bucket_item(
        &mut self,
        parent: &mut Bucket,
        decls: &HashMap<String, DeviceDecl>,
        by_name: &HashMap<String, BucketId>,
        buckets: &mut HashMap<BucketId, Bucket>,
        devices: &mut BTreeMap<DeviceId, Device>,
        child2parent: &mut HashMap<String, String>,
    ) -> Result<bool> {
        match self.read_word() {
            Some("item") => self.advance("item".len()),
            _ => {
                if self.match_substr("}") {
                    return Ok(false);
                }
                return Err(self.err_with_line("expected an item declaration"));
            }
        }
        self.skip_space_inline()?;

        let Some(item_name) = self.read_word() else {
            return Err(self.err_with_line("expected an item name"));
        };

        let child_bucket = by_name.get(item_name).copied();
        let mut weight_is_required = true;
        if let Some(child_id) = child_bucket {
            let child_kind = buckets
                .get(&child_id)
                .map_or(NodeType::Root, |b| b.kind);
            if child_kind >= parent.kind {
                return Err(self.err_with_line(&format!(
                    "hierarchy violation: {} ({}) cannot be a child of {} ({})",
                    item_name, child_kind, parent.name, parent.kind
                )));
            }
            weight_is_required = false;
        } else if !decls.contains_key(item_name) {
            return Err(self.err_with_line("unknown item"));
        }

        if let Some(owner) = child2parent.get(item_name) {
            return Err(self.err_with_line(&format!("item already registered at {}", owner)));
        }
        child2parent.insert(item_name.to_string(), parent.name.clone());

        let item_name = item_name.to_string();
        self.advance(item_name.len());
        self.skip_space_inline()?;

        let mut weight: Option<Weight> = None;
        loop {
            let Some(key) = self.read_word() else {
                if self.at_end() {
                    return Err(self.err_with_line("unexpected end of input"));
                }
                if self.text[self.cursor].is_ascii_whitespace() {
                    break;
                }
                return Err(self.err_with_line("bad field name"));
            };

            if key == "weight" {
                if !weight_is_required {
                    return Err(self.err_with_line("can't assign weight to a bucket"));
                }
                self.advance(key.len());
                self.skip_space_inline()?;

                let Some(raw) = self.read_float() else {
                    return Err(self.err_with_line("expected a float number"));
                };
                let value: f64 = raw
                    .parse()
                    .map_err(|_| self.err_with_line("expected a float number"))?;
                weight = Some(Weight::from_f64(value));

                self.advance(raw.len());
                self.skip_space_inline()?;
            } else {
                return Err(self.err_with_line("unexpected attribute"));
            }
        }

        if let Some(child_id) = child_bucket {
            if let Some(child) = buckets.get_mut(&child_id) {
                child.parent = Some(parent.id);
            }
            parent.children.push(child_id);
            return Ok(true);
        }

        let Some(weight) = weight else {
            return Err(self.err_with_line("no weight was declared"));
        };
        let Some(decl) = decls.get(item_name.as_str()) else {
            return Err(self.err_with_line("unknown item"));
        };
        devices.insert(
            decl.id,
            Device {
                id: decl.id,
                class: decl.class.clone(),
                weight,
                parent: parent.id,
            },
        );
        parent.children.push(decl.id);
        Ok(true)
    }

    // ---- rules ----

    fn parse_rules(&mut self, bucket_names: &HashSet<String>) -> Result<Vec<Rule>> {
        let mut rules = Vec::new();
        let mut seen_ids: HashSet<u32> = HashSet::new();
        let mut seen_names: HashSet<String> = HashSet::new();

        loop {
            if self.at_end() {
                return Ok(rules);
            }

            if !self.match_substr("rule") {
                return Err(self.err_with_line("expected a rule declaration"));
            }
            self.advance("rule".len());
            self.skip_space_inline()?;

            let Some(rule_name) = self.read_word() else {
                return Err(self.err_with_line("expected a rule name"));
            };
            let rule_name = rule_name.to_string();
            self.advance(rule_name.len());
            self.skip_space_inline()?;

            let rule = self.parse_rule_block(&rule_name, bucket_names)?;
            if !seen_ids.insert(rule.id) {
                return Err(
                    self.err_with_line(&format!("rule with id `{}` already exists", rule.id))
                );
            }
            if !seen_names.insert(rule.name.clone()) {
                return Err(
                    self.err_with_line(&format!("rule with name `{}` already exists", rule.name))
                );
            }

            rules.push(rule);
            self.skip_ws_required_newline()?;
        }
    }

    fn parse_rule_block(&mut self, name: &str, bucket_names: &HashSet<String>) -> Result<Rule> {
        if !self.match_substr("{") {
            return Err(self.err_with_line("expected a rule block"));
        }
        self.advance(1);
        self.skip_ws_required_newline()?;

        let mut rule_id: Option<u32> = None;
        let mut min_size: u32 = 1;
        let mut max_size: u32 = 10;

        loop {
            let Some(key) = self.read_word() else {
                return Err(self.err_with_line("expected a rule attribute"));
            };
            match key {
                "id" => {
                    self.advance(key.len());
                    self.skip_space_inline()?;

                    let Some(raw) = self.read_num() else {
                        return Err(self.err_with_line("expected a rule id"));
                    };
                    rule_id = Some(
                        raw.parse()
                            .map_err(|_| self.err_with_line("rule id out of range"))?,
                    );
                    self.advance(raw.len());
                    self.skip_ws_required_newline()?;
                }
                "type" => {
                    self.advance(key.len());
                    self.skip_space_inline()?;

                    let Some(rule_type) = self.read_word() else {
                        return Err(self.err_with_line("expected the `replicated` rule type"));
                    };
                    if rule_type != "replicated" {
                        return Err(self.err_with_line("only replicated rules are supported"));
                    }
                    self.advance(rule_type.len());
                    self.skip_ws_required_newline()?;
                }
                "min_size" => {
                    self.advance(key.len());
                    self.skip_space_inline()?;

                    let Some(raw) = self.read_num() else {
                        return Err(self.err_with_line("expected min_size"));
                    };
                    min_size = raw
                        .parse()
                        .map_err(|_| self.err_with_line("min_size out of range"))?;
                    self.advance(raw.len());
                    self.skip_ws_required_newline()?;
                }
                "max_size" => {
                    self.advance(key.len());
                    self.skip_space_inline()?;

                    let Some(raw) = self.read_num() else {
                        return Err(self.err_with_line("expected max_size"));
                    };
                    max_size = raw
                        .parse()
                        .map_err(|_| self.err_with_line("max_size out of range"))?;
                    self.advance(raw.len());
                    self.skip_ws_required_newline()?;
                }
                "step" => {
                    let steps = self.parse_rule_steps(bucket_names)?;
                    if !self.match_substr("}") {
                        return Err(self.err_with_line("expected the end of the rule declaration"));
                    }
                    self.advance(1);

                    let Some(id) = rule_id else {
                        return Err(self.err_with_line("no rule id was declared"));
                    };
                    return Ok(Rule {
                        name: name.to_string(),
                        id,
                        min_size,
                        max_size,
                        steps,
                    });
                }
                _ => return Err(self.err_with_line("unexpected rule field")),
            }
        }
    }

    fn parse_rule_steps(&mut self, bucket_names: &HashSet<String>) -> Result<Vec<Step>> {
        let mut steps: Vec<Step> = Vec::new();
        loop {
            if !self.match_substr("step") {
                if self.match_substr("}") {
                    break;
                }
                return Err(self.err_with_line("expected a rule step"));
            }
            self.advance("step".len());
            self.skip_space_inline()?;

            let Some(choice) = self.read_word() else {
                return Err(self.err_with_line("expected a step type"));
            };
            let choice = choice.to_string();
            self.advance(choice.len());
            self.skip_space_inline()?;
            match choice.as_str() {
                "take" => steps.push(self.parse_step_take(bucket_names)?),
                "choose" => steps.push(self.parse_step_choose(ChooseKind::Choose)?),
                "chooseleaf" => steps.push(self.parse_step_choose(ChooseKind::ChooseLeaf)?),
                "emit" => steps.push(Step::Emit),
                _ => return Err(self.err_with_line("unexpected step type")),
            }

            self.skip_ws_required_newline()?;
        }

        if steps.is_empty() {
            return Err(self.err_with_line("rule with no steps"));
        }
        if steps.last() != Some(&Step::Emit) {
            return Err(self.err_with_line("last step of a rule has to be emit"));
        }
        Ok(steps)
    }

    fn parse_step_take(&mut self, bucket_names: &HashSet<String>) -> Result<Step> {
        let Some(bucket) = self.read_word() else {
            return Err(self.err_with_line("expected a bucket name"));
        };
        if !bucket_names.contains(bucket) {
            return Err(self.err_with_line("unknown bucket name"));
        }
        let bucket = bucket.to_string();
        self.advance(bucket.len());
        self.skip_space_inline()?;

        let Some(class_opt) = self.read_word() else {
            return Ok(Step::Take {
                name: bucket,
                class: None,
            });
        };
        if class_opt != "class" {
            return Err(
                self.err_with_line("expected the class option on the same line as the take step")
            );
        }
        self.advance(class_opt.len());
        self.skip_space_inline()?;

        let Some(class) = self.read_word() else {
            return Err(self.err_with_line("expected a device class"));
        };
        let class = class.to_string();
        self.advance(class.len());

        Ok(Step::Take {
            name: bucket,
            class: Some(class),
        })
    }

    fn parse_step_choose(&mut self, kind: ChooseKind) -> Result<Step> {
        let Some(option) = self.read_word() else {
            return Err(self.err_with_line("expected the `firstn` option"));
        };
        if option != "firstn" {
            return Err(self.err_with_line("only the `firstn` option is supported"));
        }
        self.advance(option.len());
        self.skip_space_inline()?;

        let Some(raw_n) = self.read_num() else {
            return Err(self.err_with_line("expected a number"));
        };
        let n: i32 = raw_n
            .parse()
            .map_err(|_| self.err_with_line("replica count out of range"))?;
        self.advance(raw_n.len());
        self.skip_space_inline()?;

        if !self.match_substr("type") {
            return Err(self.err_with_line("expected a `type` keyword"));
        }
        self.advance("type".len());
        self.skip_space_inline()?;

        let target = match self.read_bucket_type() {
            Some(t) => t,
            None => {
                if !self.match_substr("osd") {
                    return Err(self.err_with_line("expected a bucket type"));
                }
                NodeType::Osd
            }
        };
        self.advance(target.as_str().len());

        Ok(Step::Choose { kind, n, target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_carries_line_and_caret() {
        let err = parse("device 1 osd.1\ndevice 1 osd.2\n").unwrap_err();
        assert_eq!(err.row, 2);
        assert!(err.message.contains("2 | device 1 osd.2"));
        assert!(err.message.contains('^'));
        assert!(err.message.contains("already defined"));
    }

    #[test]
    fn device_class_is_optional() {
        let text = "\
device 1 osd.1 class ssd
device 2 osd.2

host h1 {
    id -2
    alg straw2
    hash 0
    item osd.1 weight 1.0
    item osd.2 weight 1.0
}
root default {
    id -1
    item h1
}

rule r {
    id 0
    type replicated
    step take default
    step emit
}
";
        let parsed = parse(text).unwrap();
        let h = parsed.hierarchy;
        assert_eq!(h.device(1).unwrap().class.as_deref(), Some("ssd"));
        assert_eq!(h.device(2).unwrap().class, None);
    }

    #[test]
    fn defaults_for_alg_and_sizes() {
        let text = "\
device 1 osd.1

host h1 {
    id -2
    item osd.1 weight 2.5
}
root default {
    id -1
    item h1
}

rule r {
    id 7
    type replicated
    step take default
    step choose firstn 1 type osd
    step emit
}
";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.hierarchy.bucket(-2).unwrap().alg, BucketAlg::Straw2);
        let rule = &parsed.rules[0];
        assert_eq!((rule.id, rule.min_size, rule.max_size), (7, 1, 10));
        assert_eq!(
            rule.steps[1],
            Step::Choose {
                kind: ChooseKind::Choose,
                n: 1,
                target: NodeType::Osd
            }
        );
    }
}
