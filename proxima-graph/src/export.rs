//! GEXF export (write-only)

use crate::Graph;
use crate::ItemId;
use std::fmt::Write as _;
use std::io;

impl<T> Graph<T> {
    /// Render the graph as GEXF 1.2: one `<node>` per item, one directed
    /// `<edge>` per neighbor-list entry with the similarity as its weight.
    pub fn gexf_string(&self) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str("<gexf xmlns=\"http://www.gexf.net/1.2draft\" version=\"1.2\">\n");
        out.push_str("<graph mode=\"static\" defaultedgetype=\"directed\">\n");

        let mut ids: Vec<ItemId> = self.payloads.keys().copied().collect();
        ids.sort_unstable();

        out.push_str("<nodes>\n");
        for id in &ids {
            let _ = writeln!(out, "<node id=\"{id}\" label=\"{id}\"/>");
        }
        out.push_str("</nodes>\n");

        out.push_str("<edges>\n");
        let mut edge = 0usize;
        for id in &ids {
            if let Some(nl) = self.lists.get(id) {
                for neighbor in nl.iter() {
                    let _ = writeln!(
                        out,
                        "<edge id=\"{edge}\" source=\"{id}\" target=\"{}\" weight=\"{}\"/>",
                        neighbor.id, neighbor.similarity
                    );
                    edge += 1;
                }
            }
        }
        out.push_str("</edges>\n");

        out.push_str("</graph>\n");
        out.push_str("</gexf>\n");
        out
    }

    /// Write the GEXF rendering to `writer`.
    pub fn write_gexf<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.gexf_string().as_bytes())
    }
}
