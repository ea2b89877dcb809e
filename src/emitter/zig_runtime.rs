//! The Zig runtime value library linked into every emitted program.
//!
//! The emitter prepends these sections to the generated module as
//! `const runtime = struct { ... };`, so generated code refers to
//! `runtime.PyString.concat`, `runtime.decref` and friends by name.
//! Reference-counting contract: every constructor returns an object with
//! refcount 1; collections own strong references to their elements;
//! singletons (None, True, False) are immortal and incref/decref on them
//! are no-ops.

pub const RUNTIME_PRELUDE: &str = r#"const runtime = struct {
    pub const Error = error{
        OutOfMemory,
        IndexOutOfRange,
        KeyNotFound,
        ValueNotFound,
        TypeMismatch,
        InvalidJson,
        HttpFailed,
    };

    pub const Tag = enum(u8) { int, float, bool, none, string, list, dict, tuple };

    const immortal = std.math.maxInt(usize);

    pub const PyObject = struct {
        tag: Tag,
        refcount: usize,
        data: Data,

        pub const Data = union {
            int: i64,
            float: f64,
            boolean: bool,
            none: void,
            string: StrData,
            list: ListData,
            dict: DictData,
            tuple: TupleData,
        };

        pub const StrData = struct {
            bytes: []u8,
        };

        pub const ListData = struct {
            items: std.ArrayListUnmanaged(*PyObject),
        };

        pub const DictEntry = struct {
            hash: u64,
            key: *PyObject,
            value: *PyObject,
        };

        pub const DictData = struct {
            entries: std.ArrayListUnmanaged(DictEntry),
        };

        pub const TupleData = struct {
            items: []*PyObject,
        };
    };

    var none_singleton = PyObject{ .tag = .none, .refcount = immortal, .data = .{ .none = {} } };
    var true_singleton = PyObject{ .tag = .bool, .refcount = immortal, .data = .{ .boolean = true } };
    var false_singleton = PyObject{ .tag = .bool, .refcount = immortal, .data = .{ .boolean = false } };

    pub fn none() *PyObject {
        return &none_singleton;
    }

    pub fn boolean(value: bool) *PyObject {
        return if (value) &true_singleton else &false_singleton;
    }

    pub fn incref(obj: *PyObject) void {
        if (obj.refcount == immortal) return;
        obj.refcount += 1;
    }

    pub fn decref(obj: *PyObject, allocator: std.mem.Allocator) void {
        if (obj.refcount == immortal) return;
        std.debug.assert(obj.refcount > 0);
        obj.refcount -= 1;
        if (obj.refcount == 0) {
            releaseChildren(obj, allocator);
            allocator.destroy(obj);
        }
    }

    fn releaseChildren(obj: *PyObject, allocator: std.mem.Allocator) void {
        switch (obj.tag) {
            .string => allocator.free(obj.data.string.bytes),
            .list => {
                for (obj.data.list.items.items) |item| decref(item, allocator);
                obj.data.list.items.deinit(allocator);
            },
            .dict => {
                for (obj.data.dict.entries.items) |entry| {
                    decref(entry.key, allocator);
                    decref(entry.value, allocator);
                }
                obj.data.dict.entries.deinit(allocator);
            },
            .tuple => {
                for (obj.data.tuple.items) |item| decref(item, allocator);
                allocator.free(obj.data.tuple.items);
            },
            else => {},
        }
    }

    fn createObject(allocator: std.mem.Allocator, tag: Tag, data: PyObject.Data) Error!*PyObject {
        const obj = allocator.create(PyObject) catch return Error.OutOfMemory;
        obj.* = .{ .tag = tag, .refcount = 1, .data = data };
        return obj;
    }

    pub fn truthy(obj: *PyObject) bool {
        return switch (obj.tag) {
            .int => obj.data.int != 0,
            .float => obj.data.float != 0,
            .bool => obj.data.boolean,
            .none => false,
            .string => obj.data.string.bytes.len != 0,
            .list => obj.data.list.items.items.len != 0,
            .dict => obj.data.dict.entries.items.len != 0,
            .tuple => obj.data.tuple.items.len != 0,
        };
    }

    pub fn equals(a: *PyObject, b: *PyObject) bool {
        if (a == b) return true;
        if (a.tag != b.tag) {
            const numeric = (a.tag == .int or a.tag == .bool) and (b.tag == .int or b.tag == .bool);
            if (numeric) return numericValue(a) == numericValue(b);
            return false;
        }
        return switch (a.tag) {
            .int => a.data.int == b.data.int,
            .float => a.data.float == b.data.float,
            .bool => a.data.boolean == b.data.boolean,
            .none => true,
            .string => std.mem.eql(u8, a.data.string.bytes, b.data.string.bytes),
            .list => sequenceEquals(a.data.list.items.items, b.data.list.items.items),
            .tuple => sequenceEquals(a.data.tuple.items, b.data.tuple.items),
            .dict => dictEquals(a, b),
        };
    }

    fn numericValue(obj: *PyObject) i64 {
        return switch (obj.tag) {
            .int => obj.data.int,
            .bool => @intFromBool(obj.data.boolean),
            else => 0,
        };
    }

    fn sequenceEquals(a: []*PyObject, b: []*PyObject) bool {
        if (a.len != b.len) return false;
        for (a, b) |left, right| {
            if (!equals(left, right)) return false;
        }
        return true;
    }

    fn dictEquals(a: *PyObject, b: *PyObject) bool {
        const left = a.data.dict.entries.items;
        if (left.len != b.data.dict.entries.items.len) return false;
        for (left) |entry| {
            const found = PyDict.findEntry(b, entry.hash, entry.key) orelse return false;
            if (!equals(entry.value, found.value)) return false;
        }
        return true;
    }

    pub fn contains(haystack: *PyObject, needle: *PyObject) bool {
        switch (haystack.tag) {
            .list => {
                for (haystack.data.list.items.items) |item| {
                    if (equals(item, needle)) return true;
                }
                return false;
            },
            .tuple => {
                for (haystack.data.tuple.items) |item| {
                    if (equals(item, needle)) return true;
                }
                return false;
            },
            .dict => return PyDict.findEntry(haystack, hashKey(needle), needle) != null,
            .string => {
                if (needle.tag != .string) return false;
                return std.mem.indexOf(u8, haystack.data.string.bytes, needle.data.string.bytes) != null;
            },
            else => return false,
        }
    }

    pub fn len(allocator: std.mem.Allocator, obj: *PyObject) Error!i64 {
        _ = allocator;
        return switch (obj.tag) {
            .string => @intCast(obj.data.string.bytes.len),
            .list => @intCast(obj.data.list.items.items.len),
            .dict => @intCast(obj.data.dict.entries.items.len),
            .tuple => @intCast(obj.data.tuple.items.len),
            else => Error.TypeMismatch,
        };
    }

    pub fn asInt(obj: *PyObject) Error!i64 {
        return switch (obj.tag) {
            .int => obj.data.int,
            .bool => @intFromBool(obj.data.boolean),
            else => Error.TypeMismatch,
        };
    }

    pub fn asFloat(obj: *PyObject) Error!f64 {
        return switch (obj.tag) {
            .float => obj.data.float,
            .int => @floatFromInt(obj.data.int),
            else => Error.TypeMismatch,
        };
    }

    pub fn intPow(base: i64, exponent: i64) i64 {
        if (exponent < 0) return 0;
        var result: i64 = 1;
        var b = base;
        var e = exponent;
        while (e > 0) {
            if (e & 1 == 1) result *%= b;
            b *%= b;
            e >>= 1;
        }
        return result;
    }

    pub fn sleep(seconds: i64) void {
        if (seconds <= 0) return;
        std.time.sleep(@as(u64, @intCast(seconds)) * std.time.ns_per_s);
    }

    pub fn printInt(value: i64) void {
        stdoutWriter().print("{d}", .{value}) catch {};
    }

    pub fn printFloat(value: f64) void {
        stdoutWriter().print("{d}", .{value}) catch {};
    }

    pub fn printBool(value: bool) void {
        stdoutWriter().writeAll(if (value) "True" else "False") catch {};
    }

    pub fn printSpace() void {
        stdoutWriter().writeAll(" ") catch {};
    }

    pub fn printNewline() void {
        stdoutWriter().writeAll("\n") catch {};
    }

    pub fn printObject(obj: *PyObject) void {
        const writer = stdoutWriter();
        // Top-level strings print raw, matching the source language.
        if (obj.tag == .string) {
            writer.writeAll(obj.data.string.bytes) catch {};
            return;
        }
        writeRepr(writer, obj) catch {};
    }

    fn stdoutWriter() std.fs.File.Writer {
        return std.io.getStdOut().writer();
    }

    fn writeRepr(writer: anytype, obj: *PyObject) !void {
        switch (obj.tag) {
            .int => try writer.print("{d}", .{obj.data.int}),
            .float => try writer.print("{d}", .{obj.data.float}),
            .bool => try writer.writeAll(if (obj.data.boolean) "True" else "False"),
            .none => try writer.writeAll("None"),
            .string => {
                try writer.writeByte('\'');
                try writer.writeAll(obj.data.string.bytes);
                try writer.writeByte('\'');
            },
            .list => {
                try writer.writeByte('[');
                for (obj.data.list.items.items, 0..) |item, i| {
                    if (i > 0) try writer.writeAll(", ");
                    try writeRepr(writer, item);
                }
                try writer.writeByte(']');
            },
            .tuple => {
                try writer.writeByte('(');
                for (obj.data.tuple.items, 0..) |item, i| {
                    if (i > 0) try writer.writeAll(", ");
                    try writeRepr(writer, item);
                }
                if (obj.data.tuple.items.len == 1) try writer.writeByte(',');
                try writer.writeByte(')');
            },
            .dict => {
                try writer.writeByte('{');
                for (obj.data.dict.entries.items, 0..) |entry, i| {
                    if (i > 0) try writer.writeAll(", ");
                    try writeRepr(writer, entry.key);
                    try writer.writeAll(": ");
                    try writeRepr(writer, entry.value);
                }
                try writer.writeByte('}');
            },
        }
    }

    fn hashKey(key: *PyObject) u64 {
        return switch (key.tag) {
            .string => std.hash.Wyhash.hash(0, key.data.string.bytes),
            .int => std.hash.Wyhash.hash(1, std.mem.asBytes(&key.data.int)),
            .bool => std.hash.Wyhash.hash(2, std.mem.asBytes(&key.data.boolean)),
            .none => 3,
            else => 4,
        };
    }

    pub fn getIndex(allocator: std.mem.Allocator, obj: *PyObject, index: i64) Error!*PyObject {
        switch (obj.tag) {
            .list => return sharedElement(obj.data.list.items.items, index),
            .tuple => return sharedElement(obj.data.tuple.items, index),
            .string => {
                const bytes = obj.data.string.bytes;
                const resolved = try resolveIndex(index, bytes.len);
                return PyString.create(allocator, bytes[resolved .. resolved + 1]);
            },
            .dict => {
                const key = try PyInt.create(allocator, index);
                defer decref(key, allocator);
                return getItem(allocator, obj, key);
            },
            else => return Error.TypeMismatch,
        }
    }

    pub fn getKey(allocator: std.mem.Allocator, obj: *PyObject, key: []const u8) Error!*PyObject {
        const boxed = try PyString.create(allocator, key);
        defer decref(boxed, allocator);
        return getItem(allocator, obj, boxed);
    }

    pub fn getItem(allocator: std.mem.Allocator, obj: *PyObject, key: *PyObject) Error!*PyObject {
        switch (obj.tag) {
            .dict => {
                const entry = PyDict.findEntry(obj, hashKey(key), key) orelse return Error.KeyNotFound;
                incref(entry.value);
                return entry.value;
            },
            .list, .tuple, .string => return getIndex(allocator, obj, try asInt(key)),
            else => return Error.TypeMismatch,
        }
    }

    fn sharedElement(items: []*PyObject, index: i64) Error!*PyObject {
        const resolved = try resolveIndex(index, items.len);
        const item = items[resolved];
        incref(item);
        return item;
    }

    fn resolveIndex(index: i64, length: usize) Error!usize {
        const signed_len: i64 = @intCast(length);
        const adjusted = if (index < 0) index + signed_len else index;
        if (adjusted < 0 or adjusted >= signed_len) return Error.IndexOutOfRange;
        return @intCast(adjusted);
    }

    pub const PyInt = struct {
        pub fn create(allocator: std.mem.Allocator, int_value: i64) Error!*PyObject {
            return createObject(allocator, .int, .{ .int = int_value });
        }

        pub fn value(obj: *PyObject) i64 {
            std.debug.assert(obj.tag == .int);
            return obj.data.int;
        }
    };

    pub const PyFloat = struct {
        pub fn create(allocator: std.mem.Allocator, float_value: f64) Error!*PyObject {
            return createObject(allocator, .float, .{ .float = float_value });
        }

        pub fn value(obj: *PyObject) f64 {
            std.debug.assert(obj.tag == .float);
            return obj.data.float;
        }
    };
"#;

pub const RUNTIME_STRING: &str = r#"
    pub const PyString = struct {
        pub fn create(allocator: std.mem.Allocator, bytes: []const u8) Error!*PyObject {
            const copy = allocator.dupe(u8, bytes) catch return Error.OutOfMemory;
            return adopt(allocator, copy);
        }

        /// Wraps an owned buffer without copying.
        fn adopt(allocator: std.mem.Allocator, bytes: []u8) Error!*PyObject {
            return createObject(allocator, .string, .{ .string = .{ .bytes = bytes } });
        }

        pub fn value(obj: *PyObject) []const u8 {
            std.debug.assert(obj.tag == .string);
            return obj.data.string.bytes;
        }

        fn expect(obj: *PyObject) Error![]const u8 {
            if (obj.tag != .string) return Error.TypeMismatch;
            return obj.data.string.bytes;
        }

        pub fn concat(allocator: std.mem.Allocator, a: *PyObject, b: *PyObject) Error!*PyObject {
            const left = try expect(a);
            const right = try expect(b);
            const joined = std.mem.concat(allocator, u8, &.{ left, right }) catch return Error.OutOfMemory;
            return adopt(allocator, joined);
        }

        pub fn upper(allocator: std.mem.Allocator, s: *PyObject) Error!*PyObject {
            return mapBytes(allocator, s, std.ascii.toUpper);
        }

        pub fn lower(allocator: std.mem.Allocator, s: *PyObject) Error!*PyObject {
            return mapBytes(allocator, s, std.ascii.toLower);
        }

        fn mapBytes(allocator: std.mem.Allocator, s: *PyObject, transform: fn (u8) u8) Error!*PyObject {
            const bytes = try expect(s);
            const out = allocator.alloc(u8, bytes.len) catch return Error.OutOfMemory;
            for (bytes, 0..) |byte, i| out[i] = transform(byte);
            return adopt(allocator, out);
        }

        pub fn capitalize(allocator: std.mem.Allocator, s: *PyObject) Error!*PyObject {
            const bytes = try expect(s);
            const out = allocator.alloc(u8, bytes.len) catch return Error.OutOfMemory;
            for (bytes, 0..) |byte, i| {
                out[i] = if (i == 0) std.ascii.toUpper(byte) else std.ascii.toLower(byte);
            }
            return adopt(allocator, out);
        }

        pub fn title(allocator: std.mem.Allocator, s: *PyObject) Error!*PyObject {
            const bytes = try expect(s);
            const out = allocator.alloc(u8, bytes.len) catch return Error.OutOfMemory;
            var at_word_start = true;
            for (bytes, 0..) |byte, i| {
                if (std.ascii.isAlphabetic(byte)) {
                    out[i] = if (at_word_start) std.ascii.toUpper(byte) else std.ascii.toLower(byte);
                    at_word_start = false;
                } else {
                    out[i] = byte;
                    at_word_start = true;
                }
            }
            return adopt(allocator, out);
        }

        pub fn swapcase(allocator: std.mem.Allocator, s: *PyObject) Error!*PyObject {
            const bytes = try expect(s);
            const out = allocator.alloc(u8, bytes.len) catch return Error.OutOfMemory;
            for (bytes, 0..) |byte, i| {
                out[i] = if (std.ascii.isUpper(byte))
                    std.ascii.toLower(byte)
                else if (std.ascii.isLower(byte))
                    std.ascii.toUpper(byte)
                else
                    byte;
            }
            return adopt(allocator, out);
        }

        const whitespace = " \t\r\n";

        pub fn strip(allocator: std.mem.Allocator, s: *PyObject) Error!*PyObject {
            return create(allocator, std.mem.trim(u8, try expect(s), whitespace));
        }

        pub fn lstrip(allocator: std.mem.Allocator, s: *PyObject) Error!*PyObject {
            return create(allocator, std.mem.trimLeft(u8, try expect(s), whitespace));
        }

        pub fn rstrip(allocator: std.mem.Allocator, s: *PyObject) Error!*PyObject {
            return create(allocator, std.mem.trimRight(u8, try expect(s), whitespace));
        }

        pub fn replace(allocator: std.mem.Allocator, s: *PyObject, from: *PyObject, to: *PyObject) Error!*PyObject {
            const bytes = try expect(s);
            const needle = try expect(from);
            const replacement = try expect(to);
            if (needle.len == 0) return create(allocator, bytes);
            const out = std.mem.replaceOwned(u8, allocator, bytes, needle, replacement) catch return Error.OutOfMemory;
            return adopt(allocator, out);
        }

        pub fn center(allocator: std.mem.Allocator, s: *PyObject, width: i64) Error!*PyObject {
            const bytes = try expect(s);
            if (width <= 0 or @as(usize, @intCast(width)) <= bytes.len) return create(allocator, bytes);
            const total: usize = @intCast(width);
            const out = allocator.alloc(u8, total) catch return Error.OutOfMemory;
            const left = (total - bytes.len) / 2;
            @memset(out, ' ');
            @memcpy(out[left .. left + bytes.len], bytes);
            return adopt(allocator, out);
        }

        pub fn join(allocator: std.mem.Allocator, sep: *PyObject, values: *PyObject) Error!*PyObject {
            const sep_bytes = try expect(sep);
            if (values.tag != .list) return Error.TypeMismatch;
            var buffer = std.ArrayListUnmanaged(u8){};
            errdefer buffer.deinit(allocator);
            for (values.data.list.items.items, 0..) |item, i| {
                if (i > 0) buffer.appendSlice(allocator, sep_bytes) catch return Error.OutOfMemory;
                buffer.appendSlice(allocator, try expect(item)) catch return Error.OutOfMemory;
            }
            const out = buffer.toOwnedSlice(allocator) catch return Error.OutOfMemory;
            return adopt(allocator, out);
        }

        pub fn split(allocator: std.mem.Allocator, s: *PyObject) Error!*PyObject {
            const bytes = try expect(s);
            const result = try PyList.create(allocator);
            errdefer decref(result, allocator);
            var it = std.mem.tokenizeAny(u8, bytes, whitespace);
            while (it.next()) |word| {
                const piece = try create(allocator, word);
                try PyList.append(allocator, result, piece);
            }
            return result;
        }

        pub fn splitSep(allocator: std.mem.Allocator, s: *PyObject, sep: *PyObject) Error!*PyObject {
            const bytes = try expect(s);
            const sep_bytes = try expect(sep);
            if (sep_bytes.len == 0) return Error.ValueNotFound;
            const result = try PyList.create(allocator);
            errdefer decref(result, allocator);
            var it = std.mem.splitSequence(u8, bytes, sep_bytes);
            while (it.next()) |part| {
                const piece = try create(allocator, part);
                try PyList.append(allocator, result, piece);
            }
            return result;
        }

        pub fn startswith(s: *PyObject, prefix: *PyObject) Error!*PyObject {
            return boolean(std.mem.startsWith(u8, try expect(s), try expect(prefix)));
        }

        pub fn endswith(s: *PyObject, suffix: *PyObject) Error!*PyObject {
            return boolean(std.mem.endsWith(u8, try expect(s), try expect(suffix)));
        }

        pub fn isdigit(s: *PyObject) Error!*PyObject {
            const bytes = try expect(s);
            if (bytes.len == 0) return boolean(false);
            for (bytes) |byte| {
                if (!std.ascii.isDigit(byte)) return boolean(false);
            }
            return boolean(true);
        }

        pub fn isalpha(s: *PyObject) Error!*PyObject {
            const bytes = try expect(s);
            if (bytes.len == 0) return boolean(false);
            for (bytes) |byte| {
                if (!std.ascii.isAlphabetic(byte)) return boolean(false);
            }
            return boolean(true);
        }

        pub fn find(s: *PyObject, needle: *PyObject) Error!i64 {
            const position = std.mem.indexOf(u8, try expect(s), try expect(needle)) orelse return -1;
            return @intCast(position);
        }

        pub fn index(s: *PyObject, needle: *PyObject) Error!i64 {
            const position = try find(s, needle);
            if (position < 0) return Error.ValueNotFound;
            return position;
        }

        pub fn count(s: *PyObject, needle: *PyObject) Error!i64 {
            const bytes = try expect(s);
            const needle_bytes = try expect(needle);
            if (needle_bytes.len == 0) return @intCast(bytes.len + 1);
            return @intCast(std.mem.count(u8, bytes, needle_bytes));
        }
    };
"#;

pub const RUNTIME_LIST: &str = r#"
    pub const PyList = struct {
        pub fn create(allocator: std.mem.Allocator) Error!*PyObject {
            return createObject(allocator, .list, .{ .list = .{ .items = .{} } });
        }

        /// The backing element array. The caller must know the object is a
        /// list; loop lowering guarantees this for `enumerate`/`zip`.
        pub fn items(obj: *PyObject) []*PyObject {
            std.debug.assert(obj.tag == .list);
            return obj.data.list.items.items;
        }

        fn expect(obj: *PyObject) Error!*PyObject.ListData {
            if (obj.tag != .list) return Error.TypeMismatch;
            return &obj.data.list;
        }

        /// Takes ownership of `value`'s reference.
        pub fn append(allocator: std.mem.Allocator, list: *PyObject, value: *PyObject) Error!void {
            const data = try expect(list);
            data.items.append(allocator, value) catch return Error.OutOfMemory;
        }

        /// Removes and returns the last element; the reference moves to the
        /// caller.
        pub fn pop(allocator: std.mem.Allocator, list: *PyObject) Error!*PyObject {
            _ = allocator;
            const data = try expect(list);
            if (data.items.items.len == 0) return Error.IndexOutOfRange;
            return data.items.pop();
        }

        pub fn extend(allocator: std.mem.Allocator, list: *PyObject, other: *PyObject) Error!void {
            const data = try expect(list);
            const source = switch (other.tag) {
                .list => other.data.list.items.items,
                .tuple => other.data.tuple.items,
                else => return Error.TypeMismatch,
            };
            for (source) |item| {
                incref(item);
                data.items.append(allocator, item) catch return Error.OutOfMemory;
            }
        }

        pub fn reverse(list: *PyObject) void {
            std.debug.assert(list.tag == .list);
            std.mem.reverse(*PyObject, list.data.list.items.items);
        }

        pub fn remove(allocator: std.mem.Allocator, list: *PyObject, value: *PyObject) Error!void {
            const data = try expect(list);
            for (data.items.items, 0..) |item, i| {
                if (equals(item, value)) {
                    const removed = data.items.orderedRemove(i);
                    decref(removed, allocator);
                    return;
                }
            }
            return Error.ValueNotFound;
        }

        pub fn count(list: *PyObject, value: *PyObject) Error!i64 {
            const data = try expect(list);
            var total: i64 = 0;
            for (data.items.items) |item| {
                if (equals(item, value)) total += 1;
            }
            return total;
        }

        pub fn index(list: *PyObject, value: *PyObject) Error!i64 {
            const data = try expect(list);
            for (data.items.items, 0..) |item, i| {
                if (equals(item, value)) return @intCast(i);
            }
            return Error.ValueNotFound;
        }

        pub fn insert(allocator: std.mem.Allocator, list: *PyObject, position: i64, value: *PyObject) Error!void {
            const data = try expect(list);
            const length: i64 = @intCast(data.items.items.len);
            var at = if (position < 0) position + length else position;
            if (at < 0) at = 0;
            if (at > length) at = length;
            data.items.insert(allocator, @intCast(at), value) catch return Error.OutOfMemory;
        }

        pub fn clear(allocator: std.mem.Allocator, list: *PyObject) void {
            std.debug.assert(list.tag == .list);
            for (list.data.list.items.items) |item| decref(item, allocator);
            list.data.list.items.clearRetainingCapacity();
        }

        pub fn sort(list: *PyObject) void {
            std.debug.assert(list.tag == .list);
            std.mem.sort(*PyObject, list.data.list.items.items, {}, lessThan);
        }

        fn lessThan(_: void, a: *PyObject, b: *PyObject) bool {
            if (a.tag == .string and b.tag == .string) {
                return std.mem.order(u8, a.data.string.bytes, b.data.string.bytes) == .lt;
            }
            const left = asInt(a) catch return @intFromEnum(a.tag) < @intFromEnum(b.tag);
            const right = asInt(b) catch return @intFromEnum(a.tag) < @intFromEnum(b.tag);
            return left < right;
        }

        pub fn copy(allocator: std.mem.Allocator, list: *PyObject) Error!*PyObject {
            const data = try expect(list);
            const result = try create(allocator);
            errdefer decref(result, allocator);
            for (data.items.items) |item| {
                incref(item);
                try append(allocator, result, item);
            }
            return result;
        }

        pub fn reversed(allocator: std.mem.Allocator, list: *PyObject) Error!*PyObject {
            const result = try copy(allocator, list);
            reverse(result);
            return result;
        }
    };
"#;

pub const RUNTIME_DICT: &str = r#"
    pub const PyDict = struct {
        pub fn create(allocator: std.mem.Allocator) Error!*PyObject {
            return createObject(allocator, .dict, .{ .dict = .{ .entries = .{} } });
        }

        fn expect(obj: *PyObject) Error!*PyObject.DictData {
            if (obj.tag != .dict) return Error.TypeMismatch;
            return &obj.data.dict;
        }

        fn findEntry(dict: *PyObject, hash: u64, key: *PyObject) ?*PyObject.DictEntry {
            for (dict.data.dict.entries.items) |*entry| {
                if (entry.hash == hash and equals(entry.key, key)) return entry;
            }
            return null;
        }

        /// Takes ownership of both `key` and `value` references.
        pub fn setItem(allocator: std.mem.Allocator, dict: *PyObject, key: *PyObject, value: *PyObject) Error!void {
            const data = try expect(dict);
            const hash = hashKey(key);
            if (findEntry(dict, hash, key)) |entry| {
                decref(entry.value, allocator);
                entry.value = value;
                decref(key, allocator);
                return;
            }
            data.entries.append(allocator, .{ .hash = hash, .key = key, .value = value }) catch return Error.OutOfMemory;
        }

        pub fn get(allocator: std.mem.Allocator, dict: *PyObject, key: *PyObject, default: *PyObject) Error!*PyObject {
            _ = allocator;
            _ = try expect(dict);
            if (findEntry(dict, hashKey(key), key)) |entry| {
                incref(entry.value);
                return entry.value;
            }
            incref(default);
            return default;
        }

        pub fn keys(allocator: std.mem.Allocator, dict: *PyObject) Error!*PyObject {
            const data = try expect(dict);
            const result = try PyList.create(allocator);
            errdefer decref(result, allocator);
            for (data.entries.items) |entry| {
                incref(entry.key);
                try PyList.append(allocator, result, entry.key);
            }
            return result;
        }

        pub fn values(allocator: std.mem.Allocator, dict: *PyObject) Error!*PyObject {
            const data = try expect(dict);
            const result = try PyList.create(allocator);
            errdefer decref(result, allocator);
            for (data.entries.items) |entry| {
                incref(entry.value);
                try PyList.append(allocator, result, entry.value);
            }
            return result;
        }

        pub fn entryList(allocator: std.mem.Allocator, dict: *PyObject) Error!*PyObject {
            const data = try expect(dict);
            const result = try PyList.create(allocator);
            errdefer decref(result, allocator);
            for (data.entries.items) |entry| {
                incref(entry.key);
                incref(entry.value);
                const item = try pair(allocator, entry.key, entry.value);
                try PyList.append(allocator, result, item);
            }
            return result;
        }

        pub fn update(allocator: std.mem.Allocator, dict: *PyObject, other: *PyObject) Error!void {
            const source = try expect(other);
            _ = try expect(dict);
            for (source.entries.items) |entry| {
                incref(entry.key);
                incref(entry.value);
                try setItem(allocator, dict, entry.key, entry.value);
            }
        }
    };

    pub const PyTuple = struct {
        pub fn create(allocator: std.mem.Allocator, size: usize) Error!*PyObject {
            const slots = allocator.alloc(*PyObject, size) catch return Error.OutOfMemory;
            for (slots) |*slot| slot.* = none();
            return createObject(allocator, .tuple, .{ .tuple = .{ .items = slots } });
        }

        pub fn items(obj: *PyObject) []*PyObject {
            std.debug.assert(obj.tag == .tuple);
            return obj.data.tuple.items;
        }

        /// Takes ownership of `value`'s reference.
        pub fn set(tuple: *PyObject, position: usize, value: *PyObject) void {
            std.debug.assert(tuple.tag == .tuple);
            tuple.data.tuple.items[position] = value;
        }
    };

    /// Fresh 2-tuple taking ownership of both references.
    pub fn pair(allocator: std.mem.Allocator, first: *PyObject, second: *PyObject) Error!*PyObject {
        const result = try PyTuple.create(allocator, 2);
        PyTuple.set(result, 0, first);
        PyTuple.set(result, 1, second);
        return result;
    }
"#;

pub const RUNTIME_JSON: &str = r#"
    pub fn jsonLoads(allocator: std.mem.Allocator, bytes: []const u8) Error!*PyObject {
        var parser = JsonParser{ .bytes = bytes, .pos = 0 };
        parser.skipWhitespace();
        const value = try parser.parseValue(allocator);
        parser.skipWhitespace();
        if (parser.pos != bytes.len) {
            decref(value, allocator);
            return Error.InvalidJson;
        }
        return value;
    }

    const JsonParser = struct {
        bytes: []const u8,
        pos: usize,

        fn skipWhitespace(self: *JsonParser) void {
            while (self.pos < self.bytes.len) : (self.pos += 1) {
                switch (self.bytes[self.pos]) {
                    ' ', '\t', '\r', '\n' => {},
                    else => return,
                }
            }
        }

        fn peek(self: *JsonParser) Error!u8 {
            if (self.pos >= self.bytes.len) return Error.InvalidJson;
            return self.bytes[self.pos];
        }

        fn expectByte(self: *JsonParser, byte: u8) Error!void {
            if (try self.peek() != byte) return Error.InvalidJson;
            self.pos += 1;
        }

        fn expectLiteral(self: *JsonParser, literal: []const u8) Error!void {
            if (self.pos + literal.len > self.bytes.len) return Error.InvalidJson;
            if (!std.mem.eql(u8, self.bytes[self.pos .. self.pos + literal.len], literal)) return Error.InvalidJson;
            self.pos += literal.len;
        }

        fn parseValue(self: *JsonParser, allocator: std.mem.Allocator) Error!*PyObject {
            self.skipWhitespace();
            return switch (try self.peek()) {
                'n' => blk: {
                    try self.expectLiteral("null");
                    break :blk none();
                },
                't' => blk: {
                    try self.expectLiteral("true");
                    break :blk boolean(true);
                },
                'f' => blk: {
                    try self.expectLiteral("false");
                    break :blk boolean(false);
                },
                '"' => self.parseString(allocator),
                '[' => self.parseArray(allocator),
                '{' => self.parseObjectValue(allocator),
                '-', '0'...'9' => self.parseNumber(allocator),
                else => Error.InvalidJson,
            };
        }

        fn parseNumber(self: *JsonParser, allocator: std.mem.Allocator) Error!*PyObject {
            const start = self.pos;
            if (try self.peek() == '-') self.pos += 1;
            while (self.pos < self.bytes.len and std.ascii.isDigit(self.bytes[self.pos])) self.pos += 1;
            var is_float = false;
            if (self.pos < self.bytes.len and self.bytes[self.pos] == '.') {
                is_float = true;
                self.pos += 1;
                while (self.pos < self.bytes.len and std.ascii.isDigit(self.bytes[self.pos])) self.pos += 1;
            }
            if (self.pos < self.bytes.len and (self.bytes[self.pos] == 'e' or self.bytes[self.pos] == 'E')) {
                is_float = true;
                self.pos += 1;
                if (self.pos < self.bytes.len and (self.bytes[self.pos] == '+' or self.bytes[self.pos] == '-')) self.pos += 1;
                while (self.pos < self.bytes.len and std.ascii.isDigit(self.bytes[self.pos])) self.pos += 1;
            }
            const text = self.bytes[start..self.pos];
            if (text.len == 0) return Error.InvalidJson;
            if (is_float) {
                const parsed = std.fmt.parseFloat(f64, text) catch return Error.InvalidJson;
                return PyFloat.create(allocator, parsed);
            }
            const parsed = std.fmt.parseInt(i64, text, 10) catch return Error.InvalidJson;
            return PyInt.create(allocator, parsed);
        }

        fn parseString(self: *JsonParser, allocator: std.mem.Allocator) Error!*PyObject {
            try self.expectByte('"');
            var buffer = std.ArrayListUnmanaged(u8){};
            errdefer buffer.deinit(allocator);
            while (true) {
                if (self.pos >= self.bytes.len) return Error.InvalidJson;
                const byte = self.bytes[self.pos];
                self.pos += 1;
                if (byte == '"') break;
                if (byte != '\\') {
                    buffer.append(allocator, byte) catch return Error.OutOfMemory;
                    continue;
                }
                if (self.pos >= self.bytes.len) return Error.InvalidJson;
                const escape = self.bytes[self.pos];
                self.pos += 1;
                const resolved: u8 = switch (escape) {
                    '"' => '"',
                    '\\' => '\\',
                    '/' => '/',
                    'b' => 8,
                    'f' => 12,
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    'u' => {
                        const code = try self.parseHex4();
                        var encoded: [4]u8 = undefined;
                        const width = std.unicode.utf8Encode(code, &encoded) catch return Error.InvalidJson;
                        buffer.appendSlice(allocator, encoded[0..width]) catch return Error.OutOfMemory;
                        continue;
                    },
                    else => return Error.InvalidJson,
                };
                buffer.append(allocator, resolved) catch return Error.OutOfMemory;
            }
            const out = buffer.toOwnedSlice(allocator) catch return Error.OutOfMemory;
            return PyString.adopt(allocator, out);
        }

        fn parseHex4(self: *JsonParser) Error!u21 {
            if (self.pos + 4 > self.bytes.len) return Error.InvalidJson;
            const digits = self.bytes[self.pos .. self.pos + 4];
            self.pos += 4;
            const code = std.fmt.parseInt(u16, digits, 16) catch return Error.InvalidJson;
            return code;
        }

        fn parseArray(self: *JsonParser, allocator: std.mem.Allocator) Error!*PyObject {
            try self.expectByte('[');
            const result = try PyList.create(allocator);
            errdefer decref(result, allocator);
            self.skipWhitespace();
            if ((try self.peek()) == ']') {
                self.pos += 1;
                return result;
            }
            while (true) {
                const element = try self.parseValue(allocator);
                try PyList.append(allocator, result, element);
                self.skipWhitespace();
                switch (try self.peek()) {
                    ',' => self.pos += 1,
                    ']' => {
                        self.pos += 1;
                        return result;
                    },
                    else => return Error.InvalidJson,
                }
            }
        }

        fn parseObjectValue(self: *JsonParser, allocator: std.mem.Allocator) Error!*PyObject {
            try self.expectByte('{');
            const result = try PyDict.create(allocator);
            errdefer decref(result, allocator);
            self.skipWhitespace();
            if ((try self.peek()) == '}') {
                self.pos += 1;
                return result;
            }
            while (true) {
                self.skipWhitespace();
                const key = try self.parseString(allocator);
                self.skipWhitespace();
                self.expectByte(':') catch |err| {
                    decref(key, allocator);
                    return err;
                };
                const value = self.parseValue(allocator) catch |err| {
                    decref(key, allocator);
                    return err;
                };
                try PyDict.setItem(allocator, result, key, value);
                self.skipWhitespace();
                switch (try self.peek()) {
                    ',' => self.pos += 1,
                    '}' => {
                        self.pos += 1;
                        return result;
                    },
                    else => return Error.InvalidJson,
                }
            }
        }
    };

    pub fn jsonDumps(allocator: std.mem.Allocator, obj: *PyObject) Error!*PyObject {
        var buffer = std.ArrayListUnmanaged(u8){};
        errdefer buffer.deinit(allocator);
        try writeJson(allocator, &buffer, obj);
        const out = buffer.toOwnedSlice(allocator) catch return Error.OutOfMemory;
        return PyString.adopt(allocator, out);
    }

    fn writeJson(allocator: std.mem.Allocator, buffer: *std.ArrayListUnmanaged(u8), obj: *PyObject) Error!void {
        switch (obj.tag) {
            .none => appendJson(allocator, buffer, "null") catch return Error.OutOfMemory,
            .bool => appendJson(allocator, buffer, if (obj.data.boolean) "true" else "false") catch return Error.OutOfMemory,
            .int => {
                var scratch: [32]u8 = undefined;
                const text = std.fmt.bufPrint(&scratch, "{d}", .{obj.data.int}) catch return Error.OutOfMemory;
                appendJson(allocator, buffer, text) catch return Error.OutOfMemory;
            },
            .float => {
                var scratch: [64]u8 = undefined;
                const text = std.fmt.bufPrint(&scratch, "{d}", .{obj.data.float}) catch return Error.OutOfMemory;
                appendJson(allocator, buffer, text) catch return Error.OutOfMemory;
            },
            .string => try writeJsonString(allocator, buffer, obj.data.string.bytes),
            .list => {
                buffer.append(allocator, '[') catch return Error.OutOfMemory;
                for (obj.data.list.items.items, 0..) |item, i| {
                    if (i > 0) buffer.append(allocator, ',') catch return Error.OutOfMemory;
                    try writeJson(allocator, buffer, item);
                }
                buffer.append(allocator, ']') catch return Error.OutOfMemory;
            },
            .tuple => {
                buffer.append(allocator, '[') catch return Error.OutOfMemory;
                for (obj.data.tuple.items, 0..) |item, i| {
                    if (i > 0) buffer.append(allocator, ',') catch return Error.OutOfMemory;
                    try writeJson(allocator, buffer, item);
                }
                buffer.append(allocator, ']') catch return Error.OutOfMemory;
            },
            .dict => {
                buffer.append(allocator, '{') catch return Error.OutOfMemory;
                for (obj.data.dict.entries.items, 0..) |entry, i| {
                    if (i > 0) buffer.append(allocator, ',') catch return Error.OutOfMemory;
                    if (entry.key.tag != .string) return Error.TypeMismatch;
                    try writeJsonString(allocator, buffer, entry.key.data.string.bytes);
                    buffer.append(allocator, ':') catch return Error.OutOfMemory;
                    try writeJson(allocator, buffer, entry.value);
                }
                buffer.append(allocator, '}') catch return Error.OutOfMemory;
            },
        }
    }

    fn appendJson(allocator: std.mem.Allocator, buffer: *std.ArrayListUnmanaged(u8), text: []const u8) !void {
        try buffer.appendSlice(allocator, text);
    }

    fn writeJsonString(allocator: std.mem.Allocator, buffer: *std.ArrayListUnmanaged(u8), bytes: []const u8) Error!void {
        buffer.append(allocator, '"') catch return Error.OutOfMemory;
        for (bytes) |byte| {
            switch (byte) {
                '"' => appendJson(allocator, buffer, "\\\"") catch return Error.OutOfMemory,
                '\\' => appendJson(allocator, buffer, "\\\\") catch return Error.OutOfMemory,
                '\n' => appendJson(allocator, buffer, "\\n") catch return Error.OutOfMemory,
                '\r' => appendJson(allocator, buffer, "\\r") catch return Error.OutOfMemory,
                '\t' => appendJson(allocator, buffer, "\\t") catch return Error.OutOfMemory,
                else => {
                    if (byte < 0x20) {
                        var scratch: [8]u8 = undefined;
                        const text = std.fmt.bufPrint(&scratch, "\\u{x:0>4}", .{byte}) catch return Error.OutOfMemory;
                        appendJson(allocator, buffer, text) catch return Error.OutOfMemory;
                    } else {
                        buffer.append(allocator, byte) catch return Error.OutOfMemory;
                    }
                },
            }
        }
        buffer.append(allocator, '"') catch return Error.OutOfMemory;
    }
"#;

pub const RUNTIME_HTTP: &str = r#"
    /// Single synchronous GET. Network failure is fatal to the calling
    /// operation; the result is a (status, body) 2-tuple.
    pub fn httpGet(allocator: std.mem.Allocator, url: *PyObject) Error!*PyObject {
        if (url.tag != .string) return Error.TypeMismatch;
        var client = std.http.Client{ .allocator = allocator };
        defer client.deinit();
        var body = std.ArrayList(u8).init(allocator);
        defer body.deinit();
        const result = client.fetch(.{
            .location = .{ .url = PyString.value(url) },
            .response_storage = .{ .dynamic = &body },
        }) catch return Error.HttpFailed;
        const status = try PyInt.create(allocator, @intFromEnum(result.status));
        errdefer decref(status, allocator);
        const text = try PyString.create(allocator, body.items);
        errdefer decref(text, allocator);
        return pair(allocator, status, text);
    }
};
"#;

/// The complete runtime namespace prepended to every emitted module.
pub fn runtime_source() -> String {
    let mut source = String::new();
    source.push_str(RUNTIME_PRELUDE);
    source.push_str(RUNTIME_STRING);
    source.push_str(RUNTIME_LIST);
    source.push_str(RUNTIME_DICT);
    source.push_str(RUNTIME_JSON);
    source.push_str(RUNTIME_HTTP);
    source
}

/// Escapes source-language string contents into a Zig string literal.
pub fn escape_zig_string(value: &str) -> String {
    let mut escaped = String::new();
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                escaped.push_str(&format!("\\x{:02x}", c as u32));
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_source_is_balanced() {
        let source = runtime_source();
        let opens = source.matches('{').count();
        let closes = source.matches('}').count();
        assert_eq!(opens, closes);
        assert!(source.starts_with("const runtime = struct {"));
        assert!(source.trim_end().ends_with("};"));
    }

    #[test]
    fn runtime_exports_the_value_api() {
        let source = runtime_source();
        for symbol in [
            "pub fn incref",
            "pub fn decref",
            "pub fn truthy",
            "pub fn len(",
            "pub const PyInt",
            "pub const PyFloat",
            "pub const PyString",
            "pub const PyList",
            "pub const PyDict",
            "pub const PyTuple",
            "pub fn jsonLoads",
            "pub fn jsonDumps",
            "pub fn httpGet",
            "pub fn sleep",
        ] {
            assert!(source.contains(symbol), "missing runtime symbol {symbol}");
        }
    }

    #[test]
    fn escapes_zig_strings() {
        assert_eq!(escape_zig_string("a\"b"), "a\\\"b");
        assert_eq!(escape_zig_string("line\nbreak"), "line\\nbreak");
        assert_eq!(escape_zig_string("back\\slash"), "back\\\\slash");
        assert_eq!(escape_zig_string("bell\u{7}"), "bell\\x07");
    }
}
