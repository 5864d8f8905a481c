use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::compiler::ir::TopLevel;
use crate::StringTable;

/// Version tag written into every persisted graph file.  Bumped whenever the
/// IR changes shape, so that a stale file is rejected instead of deserialized
/// into nonsense.
pub const GRAPH_FORMAT: u32 = 1;

/// A resolved, laid out type graph in its on-disk form.
///
/// The graph carries handles into arenas and [`StringId`](crate::StringId)s
/// into a [`StringTable`], so the file stores the string table contents and
/// the name of the ABI the layout was computed for alongside the graph
/// itself.  Loading a graph skips the parse, build, resolve, and layout
/// stages entirely; the only check made is that the requested ABI matches
/// the one the graph was laid out for.
#[derive(Debug, Serialize, Deserialize)]
pub struct GraphFile {
    format: u32,
    abi: String,
    strings: Vec<String>,
    graph: TopLevel,
}

impl GraphFile {
    pub fn new(abi: &str, strings: &StringTable, graph: TopLevel) -> GraphFile {
        GraphFile {
            format: GRAPH_FORMAT,
            abi: abi.into(),
            strings: strings.dump(),
            graph,
        }
    }

    /// The name of the ABI the stored graph was laid out for.
    pub fn abi(&self) -> &str {
        &self.abi
    }

    /// Deconstructs the file into a usable string table and graph.
    pub fn restore(self) -> (StringTable, TopLevel) {
        (StringTable::restore(self.strings), self.graph)
    }

    /// Loads a graph from the given file.
    pub fn read(file: &mut std::fs::File) -> Result<GraphFile, GraphError> {
        let gf: GraphFile = serde_yaml::from_reader(file)?;
        if gf.format != GRAPH_FORMAT {
            return Err(GraphError::Format { found: gf.format });
        }
        Ok(gf)
    }

    /// Writes the graph to the given file.
    pub fn write(&self, file: &mut std::fs::File) -> Result<(), GraphError> {
        serde_yaml::to_writer(file, self).map_err(GraphError::Serde)
    }
}

#[derive(Debug)]
pub enum GraphError {
    /// The file was written by an incompatible version of this tool.
    Format { found: u32 },

    Serde(serde_yaml::Error),
}

impl From<serde_yaml::Error> for GraphError {
    fn from(e: serde_yaml::Error) -> Self {
        GraphError::Serde(e)
    }
}

impl Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::Format { found } => write!(
                f,
                "graph file format {} is not supported (expected {})",
                found, GRAPH_FORMAT
            ),
            GraphError::Serde(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::abi::{AArch64Abi, Abi};
    use crate::compiler::diagnostics::Logger;
    use crate::compiler::emit::generate;
    use crate::compiler::ir::{Expr, ExprKind, Type, TypeKind};
    use crate::compiler::layout;
    use crate::compiler::resolve::resolve;
    use crate::compiler::{SourceMap, Span};
    use crate::project::parse_sources;
    use std::path::PathBuf;

    #[test]
    fn graph_round_trips_through_yaml() {
        let st = StringTable::new();
        let name = st.insert("uint32".into());

        let mut top = TopLevel::new();
        let ty = top.add_type(Type::primitive(name, Span::zero()));
        top.add_expr(Expr::literal(42, Span::zero()));

        let gf = GraphFile::new("aarch64", &st, top);
        let text = serde_yaml::to_string(&gf).unwrap();
        let gf2: GraphFile = serde_yaml::from_str(&text).unwrap();

        assert_eq!(gf2.format, GRAPH_FORMAT);
        assert_eq!(gf2.abi(), "aarch64");

        let (st2, top2) = gf2.restore();
        assert_eq!(st2.get(name).unwrap(), "uint32");
        assert_eq!(top2.ty(ty).kind, TypeKind::Primitive(name));
        assert_eq!(top2.expr_ids().count(), 1);
        assert_eq!(
            top2.expr(top2.expr_ids().next().unwrap()).kind,
            ExprKind::Literal(42)
        );
    }

    #[test]
    fn restored_string_table_keeps_ids() {
        let st = StringTable::new();
        let a = st.insert("thread".into());
        let b = st.insert("cpu".into());

        let gf = GraphFile::new("aarch64", &st, TopLevel::new());
        let (st2, _) = gf.restore();

        assert_eq!(st2.get(a).unwrap(), "thread");
        assert_eq!(st2.find("cpu"), Some(b));
    }

    #[test]
    fn reloaded_graph_emits_identical_code() {
        let text = "define depth constant uint32 = 1 << 3;
             define kind enumeration { idle; busy = 5; };
             define flags bitfield<16> { auto ready bool; 15 last bool; };
             define vm structure {
                 k enumeration kind;
                 f bitfield flags;
                 slots array(depth) uint8;
             };";

        let mut sm = SourceMap::new();
        sm.add_string(text, PathBuf::from("vm.tc")).unwrap();

        let st = StringTable::new();
        let logger = Logger::new();
        let abi = AArch64Abi::new();

        let mut top = parse_sources(&sm, &st, &logger).expect("Expected a valid parse");
        resolve(&mut top, &st).expect("Expected a valid resolution");
        layout::update(&mut top, &abi, &st).expect("Expected a valid layout");
        let direct = generate(&top, &abi, &st, false).expect("Expected valid output");

        let gf = GraphFile::new(abi.name(), &st, top);
        let yaml = serde_yaml::to_string(&gf).unwrap();
        let gf2: GraphFile = serde_yaml::from_str(&yaml).unwrap();
        let (st2, top2) = gf2.restore();
        let reloaded = generate(&top2, &abi, &st2, false).expect("Expected valid output");

        assert_eq!(direct, reloaded);
    }
}
