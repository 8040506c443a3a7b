//! Scriptable nodes for engine tests

use crate::context::{TreeContext, TreeOptions};
use crate::error::{Result, ViewError};
use crate::node::{
    Collapsible, DisplayRecord, NodeBase, NodeRef, NodeState, RefreshOutcome, ViewNode,
    WeakNodeRef,
};
use crate::paging::{PageRequest, Pageable, PagingState};
use crate::subscription::{Subscribeable, Subscription, SubscriptionHandle};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Weak};

/// Call counters keyed by node id
#[derive(Default)]
pub(crate) struct Probe {
    loads: DashMap<String, usize>,
    subscribed: DashMap<String, usize>,
    released: DashMap<String, usize>,
    show_more: DashMap<String, usize>,
}

impl Probe {
    fn bump(map: &DashMap<String, usize>, id: &str) {
        *map.entry(id.to_string()).or_insert(0) += 1;
    }

    fn read(map: &DashMap<String, usize>, id: &str) -> usize {
        map.get(id).map(|v| *v).unwrap_or(0)
    }

    pub(crate) fn loads(&self, id: &str) -> usize {
        Self::read(&self.loads, id)
    }

    pub(crate) fn total_loads(&self) -> usize {
        self.loads.iter().map(|e| *e.value()).sum()
    }

    pub(crate) fn subscribed(&self, id: &str) -> usize {
        Self::read(&self.subscribed, id)
    }

    pub(crate) fn released(&self, id: &str) -> usize {
        Self::read(&self.released, id)
    }

    pub(crate) fn show_more_calls(&self, id: &str) -> usize {
        Self::read(&self.show_more, id)
    }
}

pub(crate) fn probe() -> (Arc<Probe>, TreeContext) {
    (Arc::new(Probe::default()), TreeContext::new(TreeOptions::default()))
}

/// Shape of a test node and its subtree
#[derive(Clone)]
pub(crate) struct TestSpec {
    pub(crate) name: String,
    pub(crate) children: Vec<TestSpec>,
    page: Option<usize>,
    subscribed: bool,
    failing: bool,
    outcome: RefreshOutcome,
}

impl TestSpec {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            children: Vec::new(),
            page: None,
            subscribed: false,
            failing: false,
            outcome: RefreshOutcome::Propagate,
        }
    }

    /// Add leaf children
    pub(crate) fn children<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.children.extend(names.into_iter().map(TestSpec::new));
        self
    }

    pub(crate) fn child(mut self, child: TestSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Pageable with an initial window of `page` children
    pub(crate) fn paged(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub(crate) fn subscribed(mut self) -> Self {
        self.subscribed = true;
        self
    }

    /// Children and display record fail
    pub(crate) fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub(crate) fn skip_refresh(mut self) -> Self {
        self.outcome = RefreshOutcome::Skip;
        self
    }
}

pub(crate) struct TestNode {
    me: Weak<TestNode>,
    base: NodeBase,
    spec: TestSpec,
    probe: Arc<Probe>,
    paging: Option<PagingState>,
    subscription: SubscriptionHandle,
}

impl TestNode {
    pub(crate) fn root(spec: TestSpec, context: &TreeContext, probe: &Arc<Probe>) -> NodeRef {
        let id = spec.name.clone();
        Self::create(spec, id, None, context, probe)
    }

    pub(crate) fn create(
        spec: TestSpec,
        id: String,
        parent: Option<WeakNodeRef>,
        context: &TreeContext,
        probe: &Arc<Probe>,
    ) -> Arc<TestNode> {
        let paging = spec
            .page
            .map(|page| PagingState::new(context.initial_limit(&id, Some(page))));

        Arc::new_cyclic(|me| TestNode {
            me: me.clone(),
            base: NodeBase::new(id, parent, context.clone()),
            spec,
            probe: probe.clone(),
            paging,
            subscription: SubscriptionHandle::new(),
        })
    }

    async fn load(&self) -> Result<Vec<NodeRef>> {
        let id = self.base.id().to_string();
        Probe::bump(&self.probe.loads, &id);

        if self.spec.failing {
            return Err(ViewError::compute(id, anyhow::anyhow!("scripted failure")));
        }

        let mut specs = self.spec.children.clone();
        if let Some(paging) = &self.paging {
            specs = paging.apply(specs);
        }

        let parent: WeakNodeRef = self.me.clone();
        Ok(specs
            .into_iter()
            .map(|spec| {
                let child_id = format!("{}/{}", id, spec.name);
                TestNode::create(spec, child_id, Some(parent.clone()), self.base.context(), &self.probe)
                    as NodeRef
            })
            .collect())
    }
}

#[async_trait]
impl ViewNode for TestNode {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn parent(&self) -> Option<NodeRef> {
        self.base.parent()
    }

    async fn get_children(&self) -> Result<Vec<NodeRef>> {
        if self.spec.subscribed {
            self.ensure_subscribed();
        }
        self.base.cache().get_or_load(|| self.load()).await
    }

    async fn display_record(&self) -> Result<DisplayRecord> {
        if self.spec.failing {
            return Err(ViewError::compute(self.id(), anyhow::anyhow!("scripted failure")));
        }

        let collapsible = if self.spec.children.is_empty() {
            Collapsible::None
        } else {
            Collapsible::Collapsed
        };
        Ok(DisplayRecord::new(self.id(), self.spec.name.clone(), collapsible))
    }

    async fn refresh(&self, reset: bool) -> Result<RefreshOutcome> {
        if reset {
            self.base.reset_children();
        }
        Ok(self.spec.outcome)
    }

    fn dispose(&self) {
        if self.base.dispose() {
            self.subscription.dispose();
        }
    }

    fn state(&self) -> NodeState {
        self.base.state()
    }

    fn as_pageable(&self) -> Option<&dyn Pageable> {
        self.paging.as_ref().map(|_| self as &dyn Pageable)
    }

    fn as_subscribeable(&self) -> Option<&dyn Subscribeable> {
        self.spec.subscribed.then_some(self as &dyn Subscribeable)
    }
}

#[async_trait]
impl Pageable for TestNode {
    fn limit(&self) -> Option<usize> {
        self.paging.as_ref().and_then(|p| p.limit())
    }

    fn has_more(&self) -> bool {
        self.paging.as_ref().map(|p| p.has_more()).unwrap_or(false)
    }

    async fn show_more(&self, request: PageRequest) -> Result<()> {
        let Some(paging) = &self.paging else {
            return Ok(());
        };
        Probe::bump(&self.probe.show_more, self.id());

        let loaded = self.base.cache().peek().map(|c| c.len()).unwrap_or(0);
        match request {
            PageRequest::Count(count) => {
                paging.grow(count, loaded);
            }
            PageRequest::Until(name) => {
                if let Some(pos) = self.spec.children.iter().position(|c| c.name == name) {
                    paging.set_limit(Some((pos + 1).max(loaded)));
                }
            }
            PageRequest::All => paging.unbounded(),
        }

        self.base.reset_children();
        Ok(())
    }
}

impl Subscribeable for TestNode {
    fn subscription(&self) -> &SubscriptionHandle {
        &self.subscription
    }

    fn subscribe(&self) -> Result<Subscription> {
        let id = self.base.id().to_string();
        Probe::bump(&self.probe.subscribed, &id);

        let probe = self.probe.clone();
        Ok(Subscription::new(move || Probe::bump(&probe.released, &id)))
    }
}
