use std::collections::BTreeMap;

use ::proptest::prelude::*;
use bytes::Bytes;

use super::test_data::{TestNarEvent, TestNarEvents};

pub fn arb_filename() -> impl Strategy<Value = String> {
    "[a-zA-Z 0-9.?=+]+".prop_filter("Not cur and parent dir", |s| s != "." && s != "..")
}

#[derive(Clone, Debug)]
pub enum NarTree {
    File(bool, Vec<u8>),
    Symlink(String),
    Dir(BTreeMap<String, NarTree>),
}

impl NarTree {
    fn events(self, ls: &mut TestNarEvents) {
        match self {
            NarTree::File(executable, contents) => ls.push(TestNarEvent::File {
                executable,
                contents: Bytes::from(contents),
            }),
            NarTree::Symlink(target) => ls.push(TestNarEvent::Symlink {
                target: Bytes::from(target),
            }),
            NarTree::Dir(tree) => {
                ls.push(TestNarEvent::StartDirectory);
                for (name, node) in tree {
                    ls.push(TestNarEvent::Entry {
                        name: Bytes::from(name),
                    });
                    node.events(ls);
                }
                ls.push(TestNarEvent::EndDirectory);
            }
        }
    }

    pub fn into_events(self) -> TestNarEvents {
        let mut ret = Vec::new();
        self.events(&mut ret);
        ret
    }
}

pub fn arb_nar_tree(
    depth: u32,
    desired_size: u32,
    expected_branch_size: u32,
) -> impl Strategy<Value = NarTree> {
    let leaf = prop_oneof![
        (any::<bool>(), any::<Vec<u8>>()).prop_map(|(e, c)| NarTree::File(e, c)),
        "[a-zA-Z 0-9.?=+/]{1,64}".prop_map(NarTree::Symlink),
    ];
    leaf.prop_recursive(depth, desired_size, expected_branch_size, move |inner| {
        prop::collection::btree_map(arb_filename(), inner, 0..expected_branch_size as usize)
            .prop_map(NarTree::Dir)
    })
}

pub fn arb_nar_events(
    depth: u32,
    desired_size: u32,
    expected_branch_size: u32,
) -> impl Strategy<Value = TestNarEvents> {
    arb_nar_tree(depth, desired_size, expected_branch_size).prop_map(NarTree::into_events)
}
