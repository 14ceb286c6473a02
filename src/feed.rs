//! Paginated "purchased" and "sold" order lists.
//!
//! A feed accumulates pages as the user scrolls. Loading is split into
//! [`OrderFeed::begin`] and [`OrderFeed::finish`] so an event loop can keep
//! handling input while a page is in flight; [`OrderFeed::load_next`] runs
//! both for callers that simply await.

use tracing::{info, warn};

use crate::{
    api::OrderService,
    errors::ClientError,
    orders::{Order, OrderPage, UserId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Purchased,
    Sold,
}

/// A page fetch handed out by [`OrderFeed::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub kind: FeedKind,
    pub page: u32,
    pub size: u32,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedUpdate {
    /// First page loaded, list replaced.
    Replaced(usize),
    Appended(usize),
    /// Result belonged to a feed that has since been reset.
    Discarded,
    Failed,
    /// Nothing fetched: a load is in flight, no more pages, or no viewer.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollPosition {
    pub viewport_height: f64,
    pub scroll_top: f64,
    pub document_height: f64,
}

impl ScrollPosition {
    pub const THRESHOLD: f64 = 100.0;

    pub fn near_bottom(&self) -> bool {
        self.viewport_height + self.scroll_top + Self::THRESHOLD >= self.document_height
    }
}

#[derive(Debug)]
pub struct OrderFeed {
    kind: FeedKind,
    page_size: u32,
    orders: Vec<Order>,
    next_page: u32,
    has_more: bool,
    in_flight: bool,
    error: Option<ClientError>,
    viewer: Option<UserId>,
    generation: u64,
}

impl OrderFeed {
    pub fn new(kind: FeedKind, page_size: u32) -> Self {
        OrderFeed {
            kind,
            page_size: page_size.max(1),
            orders: Vec::new(),
            next_page: 0,
            has_more: true,
            in_flight: false,
            error: None,
            viewer: None,
            generation: 0,
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Set when the last load failed; the view shows a retry control instead of the list.
    pub fn error(&self) -> Option<&ClientError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<ClientError> {
        self.error.take()
    }

    pub fn viewer(&self) -> Option<UserId> {
        self.viewer
    }

    pub fn order_mut(&mut self, order_id: &str) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| o.order_id == order_id)
    }

    /// Swaps in a fresh copy of an order already in the list.
    pub fn replace(&mut self, order: Order) -> bool {
        match self.order_mut(&order.order_id) {
            Some(slot) => {
                *slot = order;
                true
            }
            None => false,
        }
    }

    /// Clears everything and starts over at page 0 for `viewer`.
    ///
    /// A page still in flight for the previous viewer is discarded when it lands.
    pub fn reset(&mut self, viewer: Option<UserId>) {
        self.generation += 1;
        self.orders.clear();
        self.next_page = 0;
        self.has_more = true;
        self.in_flight = false;
        self.error = None;
        self.viewer = viewer;
    }

    pub fn set_viewer(&mut self, viewer: Option<UserId>) {
        if viewer != self.viewer {
            self.reset(viewer);
        }
    }

    pub fn begin(&mut self) -> Option<PageRequest> {
        if self.in_flight || !self.has_more || self.viewer.is_none() {
            return None;
        }
        self.in_flight = true;
        self.error = None;
        Some(PageRequest {
            kind: self.kind,
            page: self.next_page,
            size: self.page_size,
            generation: self.generation,
        })
    }

    pub fn finish(
        &mut self,
        request: PageRequest,
        result: Result<OrderPage, ClientError>,
    ) -> FeedUpdate {
        if request.generation != self.generation {
            return FeedUpdate::Discarded;
        }
        self.in_flight = false;
        match result {
            Ok(page) => {
                let n = page.content.len();
                self.has_more = !page.last;
                self.next_page = request.page + 1;
                info!(
                    "{:?} feed page {} loaded: {} orders, more: {}",
                    self.kind, request.page, n, self.has_more
                );
                if request.page == 0 {
                    self.orders = page.content;
                    FeedUpdate::Replaced(n)
                } else {
                    self.orders.extend(page.content);
                    FeedUpdate::Appended(n)
                }
            }
            Err(e) => {
                warn!("{:?} feed page {} failed: {}", self.kind, request.page, e);
                self.error = Some(e);
                FeedUpdate::Failed
            }
        }
    }

    pub async fn load_next<S: OrderService + ?Sized>(&mut self, service: &S) -> FeedUpdate {
        let Some(request) = self.begin() else {
            return FeedUpdate::Skipped;
        };
        let result = match request.kind {
            FeedKind::Purchased => service.purchased_orders(request.page, request.size).await,
            FeedKind::Sold => service.sold_orders(request.page, request.size).await,
        };
        self.finish(request, result)
    }

    pub async fn on_scroll<S: OrderService + ?Sized>(
        &mut self,
        position: ScrollPosition,
        service: &S,
    ) -> FeedUpdate {
        if !position.near_bottom() {
            return FeedUpdate::Skipped;
        }
        self.load_next(service).await
    }

    /// Retries the page that failed.
    pub async fn retry<S: OrderService + ?Sized>(&mut self, service: &S) -> FeedUpdate {
        self.error = None;
        self.load_next(service).await
    }
}
