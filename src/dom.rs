//! In-memory document model.
//!
//! A minimal DOM-like tree: elements carry a tag name, attributes, a class
//! set and children, and the owning [`Document`] broadcasts a [`Mutation`]
//! whenever a node is attached under the root or an attribute changes on an
//! attached node. That stream is what keeps late-inserted images covered.
//!
//! Elements are cheap `Arc` handles; clones refer to the same node.
//! Mutations are only reported for nodes attached to the document, so
//! building a detached subtree stays silent until it is inserted.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

/// Tag name of image elements.
pub const IMAGE_TAG: &str = "img";

/// Capacity of the mutation broadcast channel. Slow observers past this
/// lag and are told how many events they missed.
const MUTATION_CHANNEL_CAPACITY: usize = 256;

/// A change reported by the document.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// A node (possibly a whole subtree) was attached under the root.
    ChildInserted(Element),
    /// A named attribute changed on an attached element. Class changes are
    /// reported under the name `class`.
    AttributeChanged { element: Element, name: String },
}

struct DocumentInner {
    root: Element,
    mutations: broadcast::Sender<Mutation>,
}

/// An element tree with mutation notification.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("images", &self.images().len())
            .finish()
    }
}

impl Document {
    pub fn new() -> Self {
        let (mutations, _) = broadcast::channel(MUTATION_CHANNEL_CAPACITY);
        let root = Element::detached("body");
        root.inner.attached.store(true, Ordering::SeqCst);
        let inner = Arc::new(DocumentInner { root, mutations });
        *inner.root.inner.document.write() = Arc::downgrade(&inner);
        Self { inner }
    }

    /// The root element every attached node hangs off.
    pub fn root(&self) -> Element {
        self.inner.root.clone()
    }

    /// Create a detached element owned by this document. It reports
    /// mutations once attached via [`Element::append_child`].
    pub fn create_element(&self, tag: impl Into<String>) -> Element {
        let element = Element::detached(tag);
        *element.inner.document.write() = Arc::downgrade(&self.inner);
        element
    }

    /// All image elements currently attached, in tree order.
    pub fn images(&self) -> Vec<Element> {
        self.inner.root.images()
    }

    /// Subscribe to the mutation stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Mutation> {
        self.inner.mutations.subscribe()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

struct ElementInner {
    tag: String,
    attributes: RwLock<HashMap<String, String>>,
    classes: RwLock<BTreeSet<String>>,
    children: RwLock<Vec<Element>>,
    document: RwLock<Weak<DocumentInner>>,
    attached: AtomicBool,
}

/// Handle to a node in the document tree.
#[derive(Clone)]
pub struct Element {
    inner: Arc<ElementInner>,
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Element {}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("tag", &self.inner.tag)
            .field("src", &self.attribute("src"))
            .field("classes", &self.classes())
            .finish()
    }
}

impl Element {
    fn detached(tag: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ElementInner {
                tag: tag.into(),
                attributes: RwLock::new(HashMap::new()),
                classes: RwLock::new(BTreeSet::new()),
                children: RwLock::new(Vec::new()),
                document: RwLock::new(Weak::new()),
                attached: AtomicBool::new(false),
            }),
        }
    }

    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    pub fn is_image(&self) -> bool {
        self.inner.tag == IMAGE_TAG
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.attributes.read().get(name).cloned()
    }

    /// Set an attribute, notifying observers when the node is attached.
    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.inner
            .attributes
            .write()
            .insert(name.clone(), value.into());
        self.emit(Mutation::AttributeChanged {
            element: self.clone(),
            name,
        });
    }

    /// The element's `src` attribute.
    pub fn src(&self) -> Option<String> {
        self.attribute("src")
    }

    pub fn set_src(&self, value: impl Into<String>) {
        self.set_attribute("src", value);
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.inner.classes.read().contains(name)
    }

    pub fn add_class(&self, name: impl Into<String>) {
        self.inner.classes.write().insert(name.into());
        self.emit(Mutation::AttributeChanged {
            element: self.clone(),
            name: "class".to_string(),
        });
    }

    pub fn remove_class(&self, name: &str) {
        self.inner.classes.write().remove(name);
        self.emit(Mutation::AttributeChanged {
            element: self.clone(),
            name: "class".to_string(),
        });
    }

    pub fn classes(&self) -> Vec<String> {
        self.inner.classes.read().iter().cloned().collect()
    }

    /// Append a child node. If this element is attached, the child subtree
    /// becomes attached and a single insertion event is emitted for it.
    pub fn append_child(&self, child: &Element) {
        self.inner.children.write().push(child.clone());
        if self.inner.attached.load(Ordering::SeqCst) {
            let document = self.inner.document.read().clone();
            attach_subtree(child, &document);
            self.emit(Mutation::ChildInserted(child.clone()));
        }
    }

    pub fn children(&self) -> Vec<Element> {
        self.inner.children.read().clone()
    }

    /// Image descendants of this element (the element itself is excluded),
    /// in tree order.
    pub fn images(&self) -> Vec<Element> {
        let mut found = Vec::new();
        collect_images(self, &mut found);
        found
    }

    fn emit(&self, mutation: Mutation) {
        if !self.inner.attached.load(Ordering::SeqCst) {
            return;
        }
        if let Some(document) = self.inner.document.read().upgrade() {
            // Send only fails when nobody is subscribed
            let _ = document.mutations.send(mutation);
        }
    }
}

fn attach_subtree(element: &Element, document: &Weak<DocumentInner>) {
    *element.inner.document.write() = document.clone();
    element.inner.attached.store(true, Ordering::SeqCst);
    for child in element.children() {
        attach_subtree(&child, document);
    }
}

fn collect_images(element: &Element, found: &mut Vec<Element>) {
    for child in element.children() {
        if child.is_image() {
            found.push(child.clone());
        }
        collect_images(&child, found);
    }
}
