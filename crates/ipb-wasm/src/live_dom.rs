//! Live DOM implementation of the document capability traits.

use ipb_core::dom::{Document, StyleReader};
use ipb_core::query::TagFilter;
use ipb_core::{DomError, ElementIdentifier, Rect, StyleProperty, Viewport};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Element, HtmlElement, ShadowRoot, Window};

/// A search root in the live tree.
#[derive(Debug, Clone)]
pub enum LiveRoot {
    Element(Element),
    Shadow(ShadowRoot),
}

pub struct LiveDocument {
    window: Window,
    document: web_sys::Document,
}

impl LiveDocument {
    pub fn new(window: Window) -> Result<Self, DomError> {
        let document = window
            .document()
            .ok_or_else(|| DomError::Host("window has no document".to_string()))?;
        Ok(Self { window, document })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    fn inline(&self, node: &Element) -> Option<web_sys::CssStyleDeclaration> {
        node.dyn_ref::<HtmlElement>().map(HtmlElement::style)
    }
}

fn host_error(err: JsValue) -> DomError {
    DomError::Host(format!("{err:?}"))
}

impl StyleReader for LiveDocument {
    type Node = Element;

    fn read(&self, node: &Element, property: StyleProperty) -> Result<String, DomError> {
        if !node.is_connected() {
            return Err(DomError::Detached);
        }
        let style = self
            .window
            .get_computed_style(node)
            .map_err(host_error)?
            .ok_or(DomError::StyleUnavailable(property.css_name()))?;
        style.get_property_value(property.css_name()).map_err(host_error)
    }
}

impl Document for LiveDocument {
    type Root = LiveRoot;

    fn body(&self) -> Option<Element> {
        self.document.body().map(Into::into)
    }

    fn html(&self) -> Option<Element> {
        self.document.document_element()
    }

    fn element_root(&self, node: &Element) -> LiveRoot {
        LiveRoot::Element(node.clone())
    }

    fn shadow_root(&self, node: &Element) -> Option<LiveRoot> {
        node.shadow_root().map(LiveRoot::Shadow)
    }

    fn shadow_host(&self, node: &Element) -> Option<Element> {
        node.get_root_node()
            .dyn_into::<ShadowRoot>()
            .ok()
            .map(|shadow| shadow.host())
    }

    fn descendants(&self, root: &LiveRoot, filter: &TagFilter) -> Vec<Element> {
        let found = match root {
            LiveRoot::Element(element) => element.query_selector_all(filter.selector()),
            LiveRoot::Shadow(shadow) => shadow.query_selector_all(filter.selector()),
        };
        let Ok(list) = found else {
            return Vec::new();
        };

        (0..list.length())
            .filter_map(|index| list.item(index))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .collect()
    }

    fn bounding_rect(&self, node: &Element) -> Result<Rect, DomError> {
        if !node.is_connected() {
            return Err(DomError::Detached);
        }
        let rect = node.get_bounding_client_rect();
        Ok(Rect::new(rect.top(), rect.left(), rect.width(), rect.height()))
    }

    fn viewport(&self) -> Viewport {
        let dimension = |value: Result<JsValue, JsValue>| value.ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
        Viewport::new(dimension(self.window.inner_width()), dimension(self.window.inner_height()))
    }

    fn identifier(&self, node: &Element) -> Result<ElementIdentifier, DomError> {
        if !node.is_connected() {
            return Err(DomError::Detached);
        }
        // className is an SVGAnimatedString on SVG elements; the attribute is always a string.
        let class_name = node.get_attribute("class").unwrap_or_default();
        Ok(ElementIdentifier::new(node.tag_name().as_str(), node.id().as_str(), class_name.as_str()))
    }

    fn inner_html(&self, node: &Element) -> Result<String, DomError> {
        if !node.is_connected() {
            return Err(DomError::Detached);
        }
        Ok(node.inner_html())
    }

    fn is_connected(&self, node: &Element) -> bool {
        node.is_connected()
    }

    fn inline_style(&self, node: &Element, property: StyleProperty) -> Option<String> {
        self.inline(node)?
            .get_property_value(property.css_name())
            .ok()
            .filter(|value| !value.is_empty())
    }

    fn set_inline_style(&mut self, node: &Element, property: StyleProperty, value: &str) -> Result<(), DomError> {
        let style = self
            .inline(node)
            .ok_or(DomError::StyleUnavailable(property.css_name()))?;
        style
            .set_property_with_priority(property.css_name(), value, "important")
            .map_err(host_error)
    }

    fn set_class_name(&mut self, node: &Element, class_name: &str) -> Result<(), DomError> {
        node.set_class_name(class_name);
        Ok(())
    }

    fn inject_style(&mut self, css: &str) -> Result<(), DomError> {
        let head = self.document.head().ok_or(DomError::HeadUnavailable)?;
        let style = self.document.create_element("style").map_err(host_error)?;
        style.set_text_content(Some(css));
        head.append_child(&style).map_err(host_error)?;
        Ok(())
    }
}
