//! Dispatch Server - order-lifecycle dispatch engine
//!
//! # 架构概述
//!
//! The engine that moves a delivery order from placement to delivery:
//!
//! - **状态机** (`lifecycle`): validates and commits order status
//!   transitions against the legal-edge table
//! - **调度协调** (`dispatch`): finds a delivery partner for a ready
//!   order, with bounded retry and operator escalation
//! - **实时广播** (`realtime`): room-scoped event fan-out to connected
//!   customer / restaurant / partner / operator sessions
//! - **后台任务** (`jobs`): deferred retry work with bounded attempts
//! - **认证** (`auth`): JWT handshake and role checks
//! - **HTTP API** (`api`): transition, intervention and query surface
//!
//! # 模块结构
//!
//! ```text
//! dispatch-server/src/
//! ├── core/          # 配置、状态、错误、服务器
//! ├── common/        # 统一错误响应、日志
//! ├── auth/          # JWT 认证
//! ├── lifecycle/     # 订单状态机 + 订单存储接口
//! ├── dispatch/      # 配送调度（单一所有者 per order）
//! ├── jobs/          # 重试任务运行器
//! ├── realtime/      # 事件广播、房间、WebSocket
//! └── api/           # HTTP 路由和处理器
//! ```

pub mod api;
pub mod auth;
pub mod common;
pub mod core;
pub mod dispatch;
pub mod jobs;
pub mod lifecycle;
pub mod realtime;

// Re-export 公共类型
pub use auth::{Claims, JwtService};
pub use common::{AppError, AppResult};
pub use core::{Config, Server, ServerState};
pub use dispatch::{AttemptLedger, DispatchCommand, DispatchCoordinator, PartnerAvailability};
pub use jobs::{JobRunner, TokioJobRunner};
pub use lifecycle::{LifecycleMachine, MemoryOrderStore, OrderStore, TransitionError};
pub use realtime::Broadcaster;

pub fn print_banner() {
    println!(
        r#"
    ____  _                  __       __
   / __ \(_)________  ____ _/ /______/ /_
  / / / / / ___/ __ \/ __ `/ __/ ___/ __ \
 / /_/ / (__  ) /_/ / /_/ / /_/ /__/ / / /
/_____/_/____/ .___/\__,_/\__/\___/_/ /_/
            /_/
    "#
    );
}
